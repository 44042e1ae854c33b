//! Flat run configuration shared by the engine and its collaborators.

use std::time::Duration;

/// Configuration for one reduction run.
#[derive(Debug, Clone)]
pub struct ReducerConfig {
    /// Maximum number of concurrently-running oracle invocations.
    pub workers: usize,

    /// Wall-clock budget for a single oracle invocation.
    pub timeout: Duration,

    /// Whether verdicts are memoized by content fingerprint.
    pub cache_enabled: bool,

    /// Whether a pass is abandoned after sustained lack of progress.
    pub give_up: bool,

    /// Strict mode: pass misbehavior and oracle launch failures abort the
    /// run instead of being logged and skipped.
    pub die_on_pass_bug: bool,

    /// Log a diff of each committed transformation.
    pub print_diff: bool,

    /// Keep per-job working directories on disk after use.
    pub save_temps: bool,

    /// Largest single-transformation size improvement (in bytes) that may
    /// be committed; larger wins are treated as failures.
    pub max_improvement: Option<u64>,

    /// Oracle exit code that marks a variant worth saving without
    /// committing it.
    pub also_interesting: Option<i32>,

    /// Skip the one-shot initial phase entirely.
    pub skip_initial_passes: bool,

    /// Pass names removed from every phase before scheduling.
    pub remove_passes: Vec<String>,

    /// Whether the interactive key watcher is active.
    pub skip_key_enabled: bool,

    /// Do not keep `.orig` backups of the input files.
    pub tidy: bool,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            workers: available_parallelism(),
            timeout: Duration::from_secs(300),
            cache_enabled: true,
            give_up: true,
            die_on_pass_bug: false,
            print_diff: false,
            save_temps: false,
            max_improvement: None,
            also_interesting: None,
            skip_initial_passes: false,
            remove_passes: Vec::new(),
            skip_key_enabled: true,
            tidy: false,
        }
    }
}

impl ReducerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_give_up(mut self, give_up: bool) -> Self {
        self.give_up = give_up;
        self
    }

    pub fn with_die_on_pass_bug(mut self, strict: bool) -> Self {
        self.die_on_pass_bug = strict;
        self
    }

    pub fn with_print_diff(mut self, print_diff: bool) -> Self {
        self.print_diff = print_diff;
        self
    }

    pub fn with_save_temps(mut self, save_temps: bool) -> Self {
        self.save_temps = save_temps;
        self
    }

    pub fn with_max_improvement(mut self, bytes: Option<u64>) -> Self {
        self.max_improvement = bytes;
        self
    }

    pub fn with_also_interesting(mut self, exit_code: Option<i32>) -> Self {
        self.also_interesting = exit_code;
        self
    }

    pub fn with_skip_initial_passes(mut self, skip: bool) -> Self {
        self.skip_initial_passes = skip;
        self
    }

    pub fn with_remove_passes(mut self, passes: Vec<String>) -> Self {
        self.remove_passes = passes;
        self
    }

    pub fn with_skip_key_enabled(mut self, enabled: bool) -> Self {
        self.skip_key_enabled = enabled;
        self
    }

    pub fn with_tidy(mut self, tidy: bool) -> Self {
        self.tidy = tidy;
        self
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}
