//! # whittle-engine
//!
//! The reduction engine: a bounded worker pool dispatching candidate
//! verifications to the oracle, the per-pass reduction loop that
//! arbitrates winners by ordinal, and the scheduler that iterates pass
//! phases to a fixed point.
//!
//! The engine is deterministic by construction: which candidate commits
//! depends only on the pass's enumeration order and the verdicts, never on
//! worker scheduling. A single coordinator drives the whole search;
//! workers only ever report back over a results channel.

pub mod control;
pub mod diff;
pub mod error;
pub mod pass_runner;
pub mod pool;
pub mod scheduler;
pub mod store;

pub use control::{ControlSignal, InteractiveControl};
pub use error::{EngineError, Result};
pub use pass_runner::{PassOutcome, GIVE_UP_THRESHOLD};
pub use pool::{JobId, VerifyResult, WorkerPool};
pub use scheduler::ReductionScheduler;
pub use store::StateStore;
