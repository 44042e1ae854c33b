//! whittle - shrink files while an interestingness test keeps passing.
//!
//! Given an executable oracle and one or more test cases, whittle applies
//! transformation passes to the files and keeps every change the oracle
//! still finds interesting (exit code 0), converging to a locally-minimal
//! variant. Candidate verification runs in parallel; results apply in a
//! deterministic order, so the outcome does not depend on the worker
//! count.
//!
//! ```bash
//! # Shrink crash.c while ./check.sh keeps exiting 0
//! whittle ./check.sh crash.c
//!
//! # Limit parallelism and keep temp dirs for inspection
//! whittle -n 4 --save-temps ./check.sh crash.c
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use whittle_core::ReducerConfig;
use whittle_engine::{ReductionScheduler, StateStore, GIVE_UP_THRESHOLD};
use whittle_oracle::OracleRunner;
use whittle_pass::{PassGroup, PassOptions, PassRegistry};

/// Pass group used when no `--pass-group-file` is given.
const DEFAULT_PASS_GROUP: &str = include_str!("../pass_groups/default.json");

const EPILOG: &str = "available shortcuts:
  s - skip execution of the current pass
  d - toggle --print-diff option
";

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(
    name = "whittle",
    about = "Shrink test cases while an interestingness test keeps passing",
    version,
    after_help = EPILOG
)]
struct CliArgs {
    /// Number of concurrent interestingness tests (default: all cores).
    #[arg(short = 'n', long = "jobs", value_name = "N")]
    jobs: Option<usize>,

    /// Interestingness test timeout in seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 300)]
    timeout: u64,

    /// Don't cache verdicts of previously-seen content.
    #[arg(long)]
    no_cache: bool,

    /// Don't give up on a pass that has made no progress for several
    /// rounds.
    #[arg(long)]
    no_give_up: bool,

    /// Terminate if a pass or the interestingness test misbehaves.
    #[arg(long)]
    die_on_pass_bug: bool,

    /// Show changes made by transformations, for debugging.
    #[arg(long)]
    print_diff: bool,

    /// Don't delete temporary working directories on termination.
    #[arg(long)]
    save_temps: bool,

    /// Largest improvement in file size from a single transformation that
    /// should be accepted.
    #[arg(long, value_name = "BYTES")]
    max_improvement: Option<u64>,

    /// Exit code (64-113 is usual) that makes whittle save a copy of the
    /// variant without committing it.
    #[arg(long, value_name = "EXIT_CODE")]
    also_interesting: Option<i32>,

    /// Skip initial passes (useful if the input is already partially
    /// reduced).
    #[arg(long)]
    skip_initial_passes: bool,

    /// Remove all instances of the specified passes from the schedule
    /// (comma-separated).
    #[arg(long, value_name = "LIST")]
    remove_pass: Option<String>,

    /// Disable skipping the rest of the current pass when "s" is pressed.
    #[arg(long)]
    skip_key_off: bool,

    /// Do not make a backup copy of each file to reduce as file.orig.
    #[arg(long)]
    tidy: bool,

    /// Try harder to reduce, including passes that may take a long time.
    #[arg(long)]
    slow: bool,

    /// JSON file defining a custom pass group.
    #[arg(long, value_name = "FILE")]
    pass_group_file: Option<PathBuf>,

    /// Log verbosity (trace, debug, info, warn, error).
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Print all available passes and exit.
    #[arg(long)]
    list_passes: bool,

    /// Executable that checks interestingness of test cases.
    #[arg(value_name = "ORACLE")]
    oracle: Option<PathBuf>,

    /// Files to reduce.
    #[arg(value_name = "TEST_CASE")]
    test_cases: Vec<PathBuf>,
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("failed to parse log filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))?;
    Ok(())
}

fn build_config(args: &CliArgs) -> ReducerConfig {
    let removed = args
        .remove_pass
        .as_deref()
        .map(|list| {
            list.split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let mut config = ReducerConfig::new()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_cache_enabled(!args.no_cache)
        .with_give_up(!args.no_give_up)
        .with_die_on_pass_bug(args.die_on_pass_bug)
        .with_print_diff(args.print_diff)
        .with_save_temps(args.save_temps)
        .with_max_improvement(args.max_improvement)
        .with_also_interesting(args.also_interesting)
        .with_skip_initial_passes(args.skip_initial_passes)
        .with_remove_passes(removed)
        .with_skip_key_enabled(!args.skip_key_off)
        .with_tidy(args.tidy);
    if let Some(jobs) = args.jobs {
        config = config.with_workers(jobs);
    }
    config
}

fn load_pass_group(args: &CliArgs, config: &ReducerConfig) -> Result<PassGroup> {
    let registry = PassRegistry::with_builtin_passes();
    let options = PassOptions {
        slow: args.slow,
        ..PassOptions::default()
    };

    let group = match &args.pass_group_file {
        Some(path) => PassGroup::load(path, &registry, &options, &config.remove_passes)
            .with_context(|| format!("failed to load pass group {}", path.display()))?,
        None => PassGroup::from_json(
            DEFAULT_PASS_GROUP,
            &registry,
            &options,
            &config.remove_passes,
        )
        .context("failed to load the default pass group")?,
    };
    Ok(group)
}

fn list_passes(group: &PassGroup) {
    let (first, main, last) = group.phase_names();
    println!("Available passes:");
    println!("INITIAL PASSES");
    for name in first {
        println!("  {}", name);
    }
    println!("MAIN PASSES");
    for name in main {
        println!("  {}", name);
    }
    println!("CLEANUP PASSES");
    for name in last {
        println!("  {}", name);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_level)?;

    let config = build_config(&args);
    let group = load_pass_group(&args, &config)?;

    if args.list_passes {
        list_passes(&group);
        return Ok(());
    }

    let Some(oracle_path) = args.oracle.as_ref() else {
        bail!("an interestingness test is required");
    };
    if args.test_cases.is_empty() {
        bail!("at least one test case is required");
    }

    let oracle = OracleRunner::new(oracle_path)
        .with_timeout(config.timeout)
        .with_also_interesting(config.also_interesting)
        .with_save_temps(config.save_temps);
    oracle
        .check_availability()
        .context("cannot use the interestingness test")?;

    let (store, state) = StateStore::load(&args.test_cases)?;

    info!(
        give_up_threshold = GIVE_UP_THRESHOLD,
        workers = config.workers,
        "whittle starting"
    );

    let mut scheduler = ReductionScheduler::new(config, Arc::new(oracle), store, state);
    let result = scheduler.reduce(&group).await;

    // Statistics are reported even when the run aborted; the best state
    // reached is what sits on disk either way.
    println!("pass statistics:");
    for (name, record) in scheduler.statistics().sorted_results() {
        println!(
            "method {} worked {} times and failed {} times",
            name, record.worked, record.failed
        );
    }

    result?;

    for file in scheduler.state().files() {
        print!("{}", String::from_utf8_lossy(&file.contents));
    }
    Ok(())
}
