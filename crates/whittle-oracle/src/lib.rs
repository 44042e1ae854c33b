//! # whittle-oracle
//!
//! Executes the user-supplied interestingness test against candidate
//! states. Each invocation gets a freshly scoped working directory with
//! the candidate's files materialized into it; the oracle's exit code is
//! the sole interestingness signal.

pub mod runner;
pub mod workdir;

pub use runner::{Oracle, OracleError, OracleRunner, Result};
pub use workdir::Workdir;
