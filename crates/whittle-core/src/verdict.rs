//! Classification of one candidate's interestingness-test outcome.

use std::fmt;

/// The result of testing one candidate against the oracle.
///
/// Every candidate resolves to exactly one verdict. Only `Interesting` can
/// win a round; everything else counts against the candidate's ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The oracle exited with code 0: the candidate should be kept.
    Interesting,
    /// The oracle exited with any unrecognized nonzero code.
    NotInteresting,
    /// The oracle exited with the configured "also interesting" code; the
    /// candidate is saved as a side artifact but never committed.
    AlsoInteresting(i32),
    /// The oracle exceeded its wall-clock budget and was killed. Scheduled
    /// like `NotInteresting` but logged distinctly.
    Timeout,
    /// The oracle could not be run at all (missing executable, permission).
    /// Recoverable by default, fatal under strict mode.
    RunnerError(String),
}

impl Verdict {
    pub fn is_interesting(&self) -> bool {
        matches!(self, Verdict::Interesting)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Interesting => write!(f, "interesting"),
            Verdict::NotInteresting => write!(f, "not interesting"),
            Verdict::AlsoInteresting(code) => write!(f, "also interesting (exit {})", code),
            Verdict::Timeout => write!(f, "timeout"),
            Verdict::RunnerError(msg) => write!(f, "runner error: {}", msg),
        }
    }
}
