//! Error types for the reduction engine.

use thiserror::Error;

use whittle_core::Verdict;
use whittle_oracle::OracleError;

/// Errors that abort a reduction run.
///
/// Per-candidate failures never appear here: they are resolved to verdicts
/// inside the pass runner. Only configuration problems, resource
/// exhaustion, and strict-mode escalations reach the run boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No test cases were given.
    #[error("no test cases to reduce")]
    NoTestCases,

    /// A test-case path has no usable file name.
    #[error("invalid test case path: {0}")]
    InvalidTestCase(String),

    /// Two test cases share a file name; candidates could not be
    /// materialized unambiguously.
    #[error("duplicate test case name: {0}")]
    DuplicateTestCase(String),

    /// A test case could not be read at startup.
    #[error("cannot read test case {path}: {source}")]
    ReadTestCase {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The unmodified input did not pass the interestingness test.
    #[error("initial input is not interesting (verdict: {0})")]
    InitialCheckFailed(Verdict),

    /// Oracle-side resource failure (working directory, materialization).
    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// A pass misbehaved and strict mode is active.
    #[error("pass {pass} misbehaved: {message}")]
    PassBug { pass: String, message: String },

    /// The interestingness test could not be launched and strict mode is
    /// active.
    #[error("interestingness test failed to run: {0}")]
    OracleRunFailed(String),

    /// Committed state could not be written back to disk.
    #[error("cannot write {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An also-interesting variant could not be saved.
    #[error("cannot save variant: {0}")]
    SaveVariant(#[source] std::io::Error),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
