//! The pass capability trait.

use whittle_core::{ReductionState, TestCaseFile};

/// Result type alias for pass operations.
pub type PassResult<T> = Result<T, PassError>;

/// Errors raised by passes and the registry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PassError {
    /// The pass produced a transformation it could not apply to the
    /// current state. Recoverable: the engine skips the candidate.
    #[error("malformed transformation at ordinal {ordinal}: {message}")]
    Malformed { ordinal: usize, message: String },

    /// The pass argument from the group definition could not be parsed.
    #[error("bad pass argument {arg:?}: {message}")]
    BadArgument { arg: String, message: String },

    /// No pass with this name is registered.
    #[error("unknown pass: {0}")]
    Unknown(String),
}

/// Outcome of asking a pass for its candidate at one ordinal.
#[derive(Debug, Clone)]
pub enum TransformOutcome {
    /// A proposed successor: the new contents of every file.
    Proposed(Vec<TestCaseFile>),
    /// No candidate exists at this or any higher ordinal for this state.
    Exhausted,
}

/// A transformation strategy that enumerates candidate reductions of the
/// current state.
///
/// Enumeration is lazy and resumable: the engine asks for ordinals in
/// order, possibly several ahead of the one it is waiting on, and restarts
/// from ordinal zero whenever a candidate is committed — ordinal meaning is
/// specific to the state it was derived from.
///
/// Implementations must be deterministic: the same state and ordinal always
/// yield the same candidate.
pub trait Pass: Send + Sync {
    /// Name of this pass for scheduling, statistics and logging.
    fn name(&self) -> &str;

    /// Produce the candidate at `ordinal` for `state`, or signal that the
    /// enumeration space is exhausted.
    fn transform(&self, state: &ReductionState, ordinal: usize) -> PassResult<TransformOutcome>;
}

impl std::fmt::Debug for dyn Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pass").field("name", &self.name()).finish()
    }
}
