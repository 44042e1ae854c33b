//! Content cache: a pure memo of previously-observed verdicts.
//!
//! The cache maps a fingerprint of (oracle identity, candidate content) to
//! the verdict observed for that content, so repeated content never costs a
//! second oracle invocation. Entries are never evicted: a run is finite and
//! reduced content is high-entropy, so the map stays bounded by run
//! lifetime. Only the coordinator mutates the cache.

use std::collections::HashMap;

use crate::state::ReductionState;
use crate::verdict::Verdict;

/// Stable fingerprint of one candidate's content under one oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Fingerprint a state under an oracle identity.
    ///
    /// File names and contents are length-prefixed so distinct file layouts
    /// can never collide by concatenation.
    pub fn compute(oracle_identity: &str, state: &ReductionState) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(oracle_identity.as_bytes());
        for file in state.files() {
            hasher.update(&(file.name.len() as u64).to_le_bytes());
            hasher.update(file.name.as_bytes());
            hasher.update(&(file.contents.len() as u64).to_le_bytes());
            hasher.update(&file.contents);
        }
        CacheKey(*hasher.finalize().as_bytes())
    }
}

/// In-memory verdict memo for the lifetime of one run.
#[derive(Debug)]
pub struct ContentCache {
    enabled: bool,
    entries: HashMap<CacheKey, Verdict>,
    hits: u64,
    misses: u64,
}

impl ContentCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a previously-observed verdict. Always misses when the cache
    /// is disabled.
    pub fn lookup(&mut self, key: &CacheKey) -> Option<Verdict> {
        if !self.enabled {
            return None;
        }
        match self.entries.get(key) {
            Some(verdict) => {
                self.hits += 1;
                Some(verdict.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Record the verdict observed for a key.
    pub fn record(&mut self, key: CacheKey, verdict: &Verdict) {
        if self.enabled {
            self.entries.insert(key, verdict.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
