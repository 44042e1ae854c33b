//! The per-pass reduction loop.
//!
//! One round enumerates candidates of the current state lazily, keeps a
//! lookahead window of unresolved ordinals dispatched to the worker pool
//! (consulting the content cache first), and arbitrates the winner: only
//! the lowest ordinal proven interesting may commit, and only after every
//! lower ordinal has resolved otherwise. Committing cancels all higher
//! in-flight candidates — they were derived from a state that no longer
//! exists — and restarts enumeration at ordinal zero against the new
//! state.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use whittle_core::{CacheKey, ContentCache, PassStatistic, ReducerConfig, ReductionState, Verdict};
use whittle_oracle::Oracle;
use whittle_pass::{Pass, TransformOutcome};

use crate::control::{ControlSignal, InteractiveControl};
use crate::diff;
use crate::error::{EngineError, Result};
use crate::pool::{JobId, WorkerPool};
use crate::store::StateStore;

/// Consecutive whole-pass invocations without progress after which a pass
/// is abandoned for the rest of the run (unless `--no-give-up`).
pub const GIVE_UP_THRESHOLD: u64 = 5;

/// Result of driving one pass to exhaustion.
#[derive(Debug, Clone, Copy)]
pub struct PassOutcome {
    /// Transformations committed during this invocation.
    pub commits: u64,
    /// Whether the user aborted the invocation with the skip key.
    pub skipped: bool,
}

/// How one enumeration round over the current state ended.
enum RoundEnd {
    Committed,
    NoWinner,
    Skipped,
}

/// Bookkeeping for one enumerated ordinal.
struct Slot {
    /// The proposed state; absent for ordinals a misbehaving pass burned.
    candidate: Option<Arc<ReductionState>>,
    key: Option<CacheKey>,
    verdict: Option<Verdict>,
    /// Whether the verdict was replayed from the cache rather than
    /// observed fresh from the oracle.
    from_cache: bool,
    #[allow(dead_code)]
    job: Option<JobId>,
}

/// Drives one pass against the current best-known state.
///
/// Borrows the scheduler's shared machinery for the duration of one pass
/// invocation; all cache and statistics writes stay on the coordinator.
pub(crate) struct PassRunner<'a> {
    pub config: &'a ReducerConfig,
    pub oracle: &'a Arc<dyn Oracle>,
    pub pool: &'a mut WorkerPool,
    pub cache: &'a mut ContentCache,
    pub stats: &'a mut PassStatistic,
    pub store: &'a mut StateStore,
    pub control: &'a mut InteractiveControl,
    pub print_diff: &'a mut bool,
}

impl PassRunner<'_> {
    /// Run `pass` to exhaustion: rounds repeat for as long as they commit,
    /// and the invocation ends on the first round without a winner.
    pub async fn run_pass(
        &mut self,
        pass: &dyn Pass,
        current: &mut Arc<ReductionState>,
    ) -> Result<PassOutcome> {
        let mut commits = 0u64;
        loop {
            let round = match self.run_round(pass, current).await {
                Ok(round) => round,
                Err(e) => {
                    // The run is over; don't leave oracle processes behind.
                    self.pool.cancel_all();
                    return Err(e);
                }
            };
            match round {
                RoundEnd::Committed => commits += 1,
                RoundEnd::NoWinner => {
                    self.stats.record_invocation_end(pass.name(), commits > 0);
                    return Ok(PassOutcome {
                        commits,
                        skipped: false,
                    });
                }
                RoundEnd::Skipped => {
                    self.stats.record_invocation_end(pass.name(), commits > 0);
                    return Ok(PassOutcome {
                        commits,
                        skipped: true,
                    });
                }
            }
        }
    }

    /// One enumeration round over the current state.
    async fn run_round(
        &mut self,
        pass: &dyn Pass,
        current: &mut Arc<ReductionState>,
    ) -> Result<RoundEnd> {
        let base_generation = current.generation();
        let mut slots: BTreeMap<usize, Slot> = BTreeMap::new();
        let mut next_ordinal = 0usize;
        let mut lowest = 0usize;
        let mut exhausted = false;

        loop {
            // User signals, polled between resolutions.
            while let Some(signal) = self.control.try_recv() {
                match signal {
                    ControlSignal::SkipPass => {
                        info!(pass = pass.name(), "skipping the rest of this pass");
                        self.pool.cancel_all();
                        return Ok(RoundEnd::Skipped);
                    }
                    ControlSignal::ToggleDiff => {
                        *self.print_diff = !*self.print_diff;
                        info!(enabled = *self.print_diff, "toggled diff printing");
                    }
                }
            }

            // Keep the lookahead window full: up to one unresolved
            // candidate per worker, ahead of the lowest unresolved
            // ordinal. Cache hits resolve without dispatch; once the
            // lowest ordinal is resolved, arbitration goes first so runs
            // of cached verdicts drain instead of piling up here.
            while !exhausted
                && unresolved(&slots) < self.pool.workers()
                && !slots.get(&lowest).map_or(false, |slot| slot.verdict.is_some())
            {
                match pass.transform(current, next_ordinal) {
                    Err(err) => {
                        if self.config.die_on_pass_bug {
                            return Err(EngineError::PassBug {
                                pass: pass.name().to_string(),
                                message: err.to_string(),
                            });
                        }
                        warn!(
                            pass = pass.name(),
                            ordinal = next_ordinal,
                            error = %err,
                            "skipping misbehaving candidate"
                        );
                        slots.insert(
                            next_ordinal,
                            Slot {
                                candidate: None,
                                key: None,
                                verdict: Some(Verdict::NotInteresting),
                                from_cache: false,
                                job: None,
                            },
                        );
                        next_ordinal += 1;
                    }
                    Ok(TransformOutcome::Exhausted) => exhausted = true,
                    Ok(TransformOutcome::Proposed(files)) => {
                        let candidate = Arc::new(current.propose(files));
                        let key = CacheKey::compute(self.oracle.identity(), &candidate);
                        if let Some(verdict) = self.cache.lookup(&key) {
                            trace!(ordinal = next_ordinal, %verdict, "cache hit");
                            slots.insert(
                                next_ordinal,
                                Slot {
                                    candidate: Some(candidate),
                                    key: Some(key),
                                    verdict: Some(verdict),
                                    from_cache: true,
                                    job: None,
                                },
                            );
                        } else {
                            let job = self.pool.submit(
                                Arc::clone(self.oracle),
                                Arc::clone(&candidate),
                                next_ordinal,
                                base_generation,
                            );
                            slots.insert(
                                next_ordinal,
                                Slot {
                                    candidate: Some(candidate),
                                    key: Some(key),
                                    verdict: None,
                                    from_cache: false,
                                    job: Some(job),
                                },
                            );
                        }
                        next_ordinal += 1;
                    }
                }
            }

            // Resolve strictly in ordinal order. An interesting verdict at
            // a higher ordinal waits here until everything below it has
            // resolved, which is what makes the outcome independent of
            // worker completion order.
            while let Some(slot) = slots.get(&lowest) {
                let Some(verdict) = slot.verdict.clone() else {
                    break;
                };
                match verdict {
                    Verdict::Interesting => {
                        let candidate = match &slot.candidate {
                            Some(candidate) => Arc::clone(candidate),
                            None => {
                                slots.remove(&lowest);
                                lowest += 1;
                                continue;
                            }
                        };
                        let removed =
                            current.total_size().saturating_sub(candidate.total_size());
                        if let Some(cap) = self.config.max_improvement {
                            if removed as u64 > cap {
                                debug!(
                                    pass = pass.name(),
                                    ordinal = lowest,
                                    removed,
                                    cap,
                                    "single-step improvement exceeds cap; rejecting"
                                );
                                slots.remove(&lowest);
                                lowest += 1;
                                continue;
                            }
                        }
                        return self.commit(pass, current, candidate, lowest, removed);
                    }
                    Verdict::AlsoInteresting(code) => {
                        if !slot.from_cache {
                            if let Some(candidate) = &slot.candidate {
                                let candidate = Arc::clone(candidate);
                                let path = self.store.save_variant(&candidate, code)?;
                                info!(
                                    pass = pass.name(),
                                    ordinal = lowest,
                                    code,
                                    path = %path.display(),
                                    "kept also-interesting variant"
                                );
                            }
                        }
                        slots.remove(&lowest);
                        lowest += 1;
                    }
                    Verdict::Timeout => {
                        warn!(
                            pass = pass.name(),
                            ordinal = lowest,
                            "interestingness test timed out"
                        );
                        slots.remove(&lowest);
                        lowest += 1;
                    }
                    Verdict::RunnerError(message) => {
                        if self.config.die_on_pass_bug {
                            return Err(EngineError::OracleRunFailed(message));
                        }
                        warn!(
                            pass = pass.name(),
                            ordinal = lowest,
                            %message,
                            "interestingness test could not run; treating as not interesting"
                        );
                        slots.remove(&lowest);
                        lowest += 1;
                    }
                    Verdict::NotInteresting => {
                        slots.remove(&lowest);
                        lowest += 1;
                    }
                }
            }

            // Entire space enumerated and resolved with no winner.
            if exhausted && lowest >= next_ordinal {
                debug!(
                    pass = pass.name(),
                    candidates = next_ordinal,
                    "round exhausted without a winner"
                );
                return Ok(RoundEnd::NoWinner);
            }

            match self.pool.next_result().await {
                Some(result) => {
                    let verdict = match result.verdict {
                        Ok(verdict) => verdict,
                        Err(e) => return Err(EngineError::Oracle(e)),
                    };
                    if result.base_generation != base_generation {
                        // A straggler from before a commit; its state no
                        // longer exists. Dropping it here is what keeps a
                        // cancelled candidate from ever overwriting a
                        // later commit.
                        trace!(
                            ordinal = result.ordinal,
                            "dropping stale result from a superseded state"
                        );
                        continue;
                    }
                    if let Some(slot) = slots.get_mut(&result.ordinal) {
                        if slot.verdict.is_none() {
                            trace!(ordinal = result.ordinal, %verdict, "resolved");
                            if let Some(key) = slot.key {
                                self.cache.record(key, &verdict);
                            }
                            slot.verdict = Some(verdict);
                        }
                    }
                }
                // Nothing in flight; the window loop will enumerate more.
                None => continue,
            }
        }
    }

    fn commit(
        &mut self,
        pass: &dyn Pass,
        current: &mut Arc<ReductionState>,
        candidate: Arc<ReductionState>,
        ordinal: usize,
        removed: usize,
    ) -> Result<RoundEnd> {
        // Everything above the winner refers to a state about to be
        // superseded.
        self.pool.cancel_all();

        if *self.print_diff {
            for old_file in current.files() {
                if let Some(new_file) = candidate.file(&old_file.name) {
                    if new_file.contents != old_file.contents {
                        info!(
                            "\n{}",
                            diff::render(&old_file.name, &old_file.contents, &new_file.contents)
                        );
                    }
                }
            }
        }

        self.store.persist(&candidate)?;
        self.stats.record_worked(pass.name());
        info!(
            pass = pass.name(),
            ordinal,
            removed,
            bytes = candidate.total_size(),
            generation = candidate.generation(),
            "committed transformation"
        );
        *current = candidate;
        Ok(RoundEnd::Committed)
    }
}

fn unresolved(slots: &BTreeMap<usize, Slot>) -> usize {
    slots.values().filter(|slot| slot.verdict.is_none()).count()
}
