//! The reduction scheduler: pass phases, fixed point, give-up.
//!
//! Phases run `first` once, `main` repeatedly until a full sweep commits
//! nothing, then `last` once. The committed state is persisted as it is
//! accepted, so whatever terminates the run, the best state reached is
//! what sits on disk.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use whittle_core::{ContentCache, PassStatistic, ReducerConfig, ReductionState, Verdict};
use whittle_oracle::Oracle;
use whittle_pass::{Pass, PassGroup};

use crate::control::InteractiveControl;
use crate::error::{EngineError, Result};
use crate::pass_runner::{PassRunner, GIVE_UP_THRESHOLD};
use crate::pool::WorkerPool;
use crate::store::StateStore;

/// Owns the run: configuration, the shared machinery, and the current
/// best-known state.
pub struct ReductionScheduler {
    config: ReducerConfig,
    oracle: Arc<dyn Oracle>,
    pool: WorkerPool,
    cache: ContentCache,
    stats: PassStatistic,
    store: StateStore,
    control: InteractiveControl,
    state: Arc<ReductionState>,
    print_diff: bool,
    given_up: HashSet<String>,
}

impl ReductionScheduler {
    pub fn new(
        config: ReducerConfig,
        oracle: Arc<dyn Oracle>,
        store: StateStore,
        initial: ReductionState,
    ) -> Self {
        let pool = WorkerPool::new(config.workers);
        let cache = ContentCache::new(config.cache_enabled);
        let control = if config.skip_key_enabled {
            InteractiveControl::spawn()
        } else {
            InteractiveControl::disabled()
        };
        let print_diff = config.print_diff;

        Self {
            config,
            oracle,
            pool,
            cache,
            stats: PassStatistic::new(),
            store,
            control,
            state: Arc::new(initial),
            print_diff,
            given_up: HashSet::new(),
        }
    }

    /// Per-pass statistics, also available after an aborted run.
    pub fn statistics(&self) -> &PassStatistic {
        &self.stats
    }

    /// The current best-known state.
    pub fn state(&self) -> &ReductionState {
        &self.state
    }

    /// The verdict memo, exposed for observability.
    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Run the reduction to completion.
    pub async fn reduce(&mut self, group: &PassGroup) -> Result<()> {
        let initial_size = self.state.total_size();

        // The unmodified input must be interesting, otherwise there is
        // nothing to preserve while shrinking.
        match self.oracle.verify(&self.state).await? {
            Verdict::Interesting => {}
            other => return Err(EngineError::InitialCheckFailed(other)),
        }

        if !self.config.tidy {
            self.store.backup()?;
        }

        info!(
            files = self.state.files().len(),
            bytes = initial_size,
            workers = self.pool.workers(),
            "starting reduction"
        );

        if self.config.skip_initial_passes {
            info!("skipping initial passes");
        } else {
            self.run_phase(&group.first, "first").await?;
        }

        let mut sweep = 0u64;
        loop {
            sweep += 1;
            let mut commits = 0u64;
            for pass in &group.main {
                commits += self.invoke_pass(pass).await?;
            }
            debug!(sweep, commits, "main sweep finished");
            if commits == 0 {
                info!(sweeps = sweep, "main phase reached a fixed point");
                break;
            }
        }

        self.run_phase(&group.last, "last").await?;

        info!(
            initial_bytes = initial_size,
            final_bytes = self.state.total_size(),
            cache_entries = self.cache.len(),
            "reduction finished"
        );
        Ok(())
    }

    /// Run each pass of a one-shot phase exactly once, regardless of
    /// progress.
    async fn run_phase(&mut self, passes: &[Arc<dyn Pass>], phase: &str) -> Result<()> {
        for pass in passes {
            debug!(phase, pass = pass.name(), "running pass");
            self.invoke_pass(pass).await?;
        }
        Ok(())
    }

    /// Drive one pass to exhaustion, honoring give-up. Returns the number
    /// of commits it made.
    async fn invoke_pass(&mut self, pass: &Arc<dyn Pass>) -> Result<u64> {
        let name = pass.name();
        if self.given_up.contains(name) {
            return Ok(0);
        }
        if self.config.give_up && self.stats.rounds_without_progress(name) >= GIVE_UP_THRESHOLD {
            info!(
                pass = name,
                threshold = GIVE_UP_THRESHOLD,
                "pass keeps making no progress; giving up on it"
            );
            self.given_up.insert(name.to_string());
            return Ok(0);
        }

        let mut runner = PassRunner {
            config: &self.config,
            oracle: &self.oracle,
            pool: &mut self.pool,
            cache: &mut self.cache,
            stats: &mut self.stats,
            store: &mut self.store,
            control: &mut self.control,
            print_diff: &mut self.print_diff,
        };
        let outcome = runner.run_pass(pass.as_ref(), &mut self.state).await?;

        if outcome.skipped {
            debug!(pass = name, "pass skipped by user");
        } else if outcome.commits > 0 {
            debug!(pass = name, commits = outcome.commits, "pass made progress");
        }
        Ok(outcome.commits)
    }
}
