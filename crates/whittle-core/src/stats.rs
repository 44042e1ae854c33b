//! Per-pass success/failure accounting.
//!
//! One [`PassRecord`] per pass, created on first invocation and kept for
//! the whole run. Mutated only by the coordinator, read once at the end.

use std::collections::HashMap;

/// Counters for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassRecord {
    /// Number of committed transformations this pass produced.
    pub worked: u64,
    /// Number of pass invocations that ended without a winner.
    pub failed: u64,
    /// Consecutive whole-pass invocations without a commit. Reset by any
    /// commit from this pass, never by phase repetition.
    pub rounds_without_progress: u64,
}

/// Process-wide per-pass statistics.
#[derive(Debug, Default)]
pub struct PassStatistic {
    records: HashMap<String, PassRecord>,
}

impl PassStatistic {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, pass: &str) -> &mut PassRecord {
        self.records.entry(pass.to_string()).or_default()
    }

    /// Record one committed transformation.
    pub fn record_worked(&mut self, pass: &str) {
        let record = self.entry(pass);
        record.worked += 1;
        record.rounds_without_progress = 0;
    }

    /// Record the end of one pass invocation: `failed` counts the
    /// invocation ending without a winner, and the no-progress streak
    /// advances unless the invocation committed at least once.
    pub fn record_invocation_end(&mut self, pass: &str, made_progress: bool) {
        let record = self.entry(pass);
        record.failed += 1;
        if made_progress {
            record.rounds_without_progress = 0;
        } else {
            record.rounds_without_progress += 1;
        }
    }

    pub fn record(&self, pass: &str) -> Option<&PassRecord> {
        self.records.get(pass)
    }

    pub fn rounds_without_progress(&self, pass: &str) -> u64 {
        self.records
            .get(pass)
            .map(|r| r.rounds_without_progress)
            .unwrap_or(0)
    }

    /// Results ordered by times worked (descending), then by name.
    pub fn sorted_results(&self) -> Vec<(&str, &PassRecord)> {
        let mut results: Vec<(&str, &PassRecord)> = self
            .records
            .iter()
            .map(|(name, record)| (name.as_str(), record))
            .collect();
        results.sort_by(|a, b| b.1.worked.cmp(&a.1.worked).then(a.0.cmp(b.0)));
        results
    }
}
