//! End-to-end properties of the reduction engine, driven by scripted
//! oracles and passes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

use whittle_core::{ReducerConfig, ReductionState, TestCaseFile, Verdict};
use whittle_engine::{ReductionScheduler, StateStore};
use whittle_oracle::{Oracle, OracleError};
use whittle_pass::{
    LineChunkPass, Pass, PassGroup, PassResult, TransformOutcome,
};

/// Oracle scripted by content: a verdict per known content, rejection for
/// everything else, an optional artificial delay per content, and an
/// invocation counter.
struct ScriptedOracle {
    verdicts: Mutex<HashMap<Vec<u8>, Verdict>>,
    delays: Mutex<HashMap<Vec<u8>, u64>>,
    invocations: AtomicUsize,
}

impl ScriptedOracle {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            verdicts: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            invocations: AtomicUsize::new(0),
        })
    }

    fn script(&self, contents: &str, verdict: Verdict) {
        self.verdicts
            .lock()
            .unwrap()
            .insert(contents.as_bytes().to_vec(), verdict);
    }

    fn delay(&self, contents: &str, millis: u64) {
        self.delays
            .lock()
            .unwrap()
            .insert(contents.as_bytes().to_vec(), millis);
    }

    fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    fn identity(&self) -> &str {
        "scripted-oracle"
    }

    async fn verify(&self, state: &ReductionState) -> Result<Verdict, OracleError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let contents = state.files()[0].contents.clone();

        let millis = self.delays.lock().unwrap().get(&contents).copied();
        if let Some(millis) = millis {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }

        let verdict = self
            .verdicts
            .lock()
            .unwrap()
            .get(&contents)
            .cloned()
            .unwrap_or(Verdict::NotInteresting);
        Ok(verdict)
    }
}

/// Writes `contents` into a temp dir and builds a scheduler around it.
fn setup(
    dir: &tempfile::TempDir,
    contents: &str,
    config: ReducerConfig,
    oracle: Arc<dyn Oracle>,
) -> ReductionScheduler {
    let path = dir.path().join("input.txt");
    std::fs::write(&path, contents).unwrap();
    let (store, state) = StateStore::load(&[path]).unwrap();
    ReductionScheduler::new(config, oracle, store, state)
}

fn read_input(dir: &tempfile::TempDir) -> String {
    String::from_utf8(std::fs::read(dir.path().join("input.txt")).unwrap()).unwrap()
}

fn test_config() -> ReducerConfig {
    ReducerConfig::new()
        .with_workers(4)
        .with_skip_key_enabled(false)
        .with_tidy(true)
}

fn main_only(pass: Arc<dyn Pass>) -> PassGroup {
    PassGroup {
        first: Vec::new(),
        main: vec![pass],
        last: Vec::new(),
    }
}

fn lines(n: usize) -> String {
    (0..n).map(|i| format!("l{}\n", i)).collect()
}

/// `lines(n)` with the i-th line removed.
fn lines_without(n: usize, skip: &[usize]) -> String {
    (0..n)
        .filter(|i| !skip.contains(i))
        .map(|i| format!("l{}\n", i))
        .collect()
}

// Determinism: with several interesting ordinals racing, the lowest must
// win no matter how worker completion order is shuffled.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lowest_interesting_ordinal_wins_under_any_completion_order() {
    let original = lines(10);
    let winner = lines_without(10, &[3]);
    let decoy = lines_without(10, &[7]);

    for seed in 0..6 {
        let oracle = ScriptedOracle::new();
        oracle.script(&original, Verdict::Interesting);
        oracle.script(&winner, Verdict::Interesting);
        oracle.script(&decoy, Verdict::Interesting);

        // Shuffle per-candidate latencies so completion order differs
        // from ordinal order differently on every iteration.
        let mut delays: Vec<u64> = (0..10).map(|i| (i as u64 % 5) * 8).collect();
        delays.shuffle(&mut StdRng::seed_from_u64(seed));
        for (i, millis) in delays.iter().enumerate() {
            oracle.delay(&lines_without(10, &[i]), *millis);
        }
        // Make the decoy resolve as fast as possible regardless.
        oracle.delay(&decoy, 0);
        oracle.delay(&winner, 40);

        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = setup(
            &dir,
            &original,
            test_config(),
            oracle.clone() as Arc<dyn Oracle>,
        );
        scheduler
            .reduce(&main_only(Arc::new(LineChunkPass::new(0))))
            .await
            .unwrap();

        assert_eq!(read_input(&dir), winner, "seed {}", seed);
        let record = scheduler.statistics().record("lines:0").unwrap();
        assert_eq!(record.worked, 1, "seed {}", seed);
    }
}

// Cache soundness: repeated content costs zero oracle invocations.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeated_content_hits_cache_instead_of_oracle() {
    let original = lines(5);
    let oracle = ScriptedOracle::new();
    oracle.script(&original, Verdict::Interesting);

    let dir = tempfile::tempdir().unwrap();
    let config = test_config().with_give_up(false);
    let mut scheduler = setup(&dir, &original, config, oracle.clone() as Arc<dyn Oracle>);
    let group = main_only(Arc::new(LineChunkPass::new(0)));

    scheduler.reduce(&group).await.unwrap();
    // Initial sanity check plus one invocation per candidate.
    assert_eq!(oracle.invocations(), 6);

    scheduler.reduce(&group).await.unwrap();
    // Only the sanity check runs again; all five candidates replay from
    // the cache.
    assert_eq!(oracle.invocations(), 7);
    assert_eq!(scheduler.cache().hits(), 5);
}

// Give-up: an always-failing pass runs exactly the threshold number of
// times, then is excluded.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pass_without_progress_is_given_up_after_threshold() {
    let original = lines(3);
    let oracle = ScriptedOracle::new();
    oracle.script(&original, Verdict::Interesting);

    let dir = tempfile::tempdir().unwrap();
    let config = test_config().with_cache_enabled(false);
    let mut scheduler = setup(&dir, &original, config, oracle.clone() as Arc<dyn Oracle>);
    let group = main_only(Arc::new(LineChunkPass::new(1)));

    for _ in 0..8 {
        scheduler.reduce(&group).await.unwrap();
    }

    let record = scheduler.statistics().record("lines:1").unwrap();
    assert_eq!(record.worked, 0);
    assert_eq!(record.failed, whittle_engine::GIVE_UP_THRESHOLD);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_give_up_retries_indefinitely() {
    let original = lines(3);
    let oracle = ScriptedOracle::new();
    oracle.script(&original, Verdict::Interesting);

    let dir = tempfile::tempdir().unwrap();
    let config = test_config().with_cache_enabled(false).with_give_up(false);
    let mut scheduler = setup(&dir, &original, config, oracle.clone() as Arc<dyn Oracle>);
    let group = main_only(Arc::new(LineChunkPass::new(1)));

    for _ in 0..8 {
        scheduler.reduce(&group).await.unwrap();
    }

    let record = scheduler.statistics().record("lines:1").unwrap();
    assert_eq!(record.failed, 8);
}

/// Pass with exactly two candidates against the 60-byte input: a 50-byte
/// cut and a 5-byte cut.
struct TwoCutPass;

impl Pass for TwoCutPass {
    fn name(&self) -> &str {
        "two-cut"
    }

    fn transform(&self, state: &ReductionState, ordinal: usize) -> PassResult<TransformOutcome> {
        let file = &state.files()[0];
        if file.contents.len() != 60 {
            return Ok(TransformOutcome::Exhausted);
        }
        let kept = match ordinal {
            0 => &file.contents[..10],
            1 => &file.contents[..55],
            _ => return Ok(TransformOutcome::Exhausted),
        };
        Ok(TransformOutcome::Proposed(vec![TestCaseFile::new(
            file.name.clone(),
            kept.to_vec(),
        )]))
    }
}

/// Oracle that accepts everything.
struct YesOracle;

#[async_trait]
impl Oracle for YesOracle {
    fn identity(&self) -> &str {
        "yes-oracle"
    }

    async fn verify(&self, _state: &ReductionState) -> Result<Verdict, OracleError> {
        Ok(Verdict::Interesting)
    }
}

// Max-improvement cap: an oversized win is never committed, a small one is.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_improvement_above_cap_is_never_committed() {
    let original = "x".repeat(60);
    let dir = tempfile::tempdir().unwrap();
    let config = test_config().with_max_improvement(Some(10));
    let mut scheduler = setup(&dir, &original, config, Arc::new(YesOracle));

    scheduler.reduce(&main_only(Arc::new(TwoCutPass))).await.unwrap();

    // The 50-byte cut was rejected, the 5-byte cut applied.
    assert_eq!(read_input(&dir).len(), 55);
    let record = scheduler.statistics().record("two-cut").unwrap();
    assert_eq!(record.worked, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_without_cap_the_large_cut_wins() {
    let original = "x".repeat(60);
    let dir = tempfile::tempdir().unwrap();
    let mut scheduler = setup(&dir, &original, test_config(), Arc::new(YesOracle));

    scheduler.reduce(&main_only(Arc::new(TwoCutPass))).await.unwrap();

    assert_eq!(read_input(&dir).len(), 10);
}

/// Removes the first line; one candidate per state.
struct DropFirstLinePass;

impl Pass for DropFirstLinePass {
    fn name(&self) -> &str {
        "drop-first"
    }

    fn transform(&self, state: &ReductionState, ordinal: usize) -> PassResult<TransformOutcome> {
        let file = &state.files()[0];
        if ordinal > 0 || file.contents.is_empty() {
            return Ok(TransformOutcome::Exhausted);
        }
        let rest = match file.contents.iter().position(|&b| b == b'\n') {
            Some(pos) => file.contents[pos + 1..].to_vec(),
            None => Vec::new(),
        };
        Ok(TransformOutcome::Proposed(vec![TestCaseFile::new(
            file.name.clone(),
            rest,
        )]))
    }
}

/// Removes the last line; one candidate per state.
struct DropLastLinePass;

impl Pass for DropLastLinePass {
    fn name(&self) -> &str {
        "drop-last"
    }

    fn transform(&self, state: &ReductionState, ordinal: usize) -> PassResult<TransformOutcome> {
        let file = &state.files()[0];
        if ordinal > 0 || file.contents.is_empty() {
            return Ok(TransformOutcome::Exhausted);
        }
        let body = &file.contents[..file.contents.len().saturating_sub(1)];
        let kept = match body.iter().rposition(|&b| b == b'\n') {
            Some(pos) => file.contents[..pos + 1].to_vec(),
            None => Vec::new(),
        };
        Ok(TransformOutcome::Proposed(vec![TestCaseFile::new(
            file.name.clone(),
            kept,
        )]))
    }
}

// Fixed point: the main phase stops exactly when a full sweep commits
// nothing — here after two sweeps.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_main_phase_stops_at_fixed_point() {
    let original = lines(4);
    let after_first = lines_without(4, &[0]);

    let oracle = ScriptedOracle::new();
    oracle.script(&original, Verdict::Interesting);
    oracle.script(&after_first, Verdict::Interesting);

    let dir = tempfile::tempdir().unwrap();
    let mut scheduler = setup(
        &dir,
        &original,
        test_config(),
        oracle.clone() as Arc<dyn Oracle>,
    );
    let group = PassGroup {
        first: Vec::new(),
        main: vec![Arc::new(DropFirstLinePass), Arc::new(DropLastLinePass)],
        last: Vec::new(),
    };

    scheduler.reduce(&group).await.unwrap();

    // Sweep 1: drop-first commits once then fails; drop-last fails.
    // Sweep 2 confirms no progress and terminates the phase.
    let first = scheduler.statistics().record("drop-first").unwrap();
    assert_eq!(first.worked, 1);
    assert_eq!(first.failed, 2);
    let last = scheduler.statistics().record("drop-last").unwrap();
    assert_eq!(last.worked, 0);
    assert_eq!(last.failed, 2);
    assert_eq!(read_input(&dir), after_first);
}

// AlsoInteresting isolation: the trajectory is unchanged and exactly one
// variant is saved on the side.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_also_interesting_never_commits_and_saves_one_variant() {
    let original = lines(5);
    let variant = lines_without(5, &[3]);

    let oracle = ScriptedOracle::new();
    oracle.script(&original, Verdict::Interesting);
    oracle.script(&variant, Verdict::AlsoInteresting(77));

    let dir = tempfile::tempdir().unwrap();
    let mut scheduler = setup(
        &dir,
        &original,
        test_config(),
        oracle.clone() as Arc<dyn Oracle>,
    );
    scheduler
        .reduce(&main_only(Arc::new(LineChunkPass::new(0))))
        .await
        .unwrap();

    // The working file never changed.
    assert_eq!(read_input(&dir), original);
    let record = scheduler.statistics().record("lines:0").unwrap();
    assert_eq!(record.worked, 0);
    assert_eq!(record.failed, 1);

    // Exactly one variant, holding the also-interesting content.
    let saved = dir.path().join("whittle_variants/variant_0001_code77/input.txt");
    assert_eq!(std::fs::read_to_string(saved).unwrap(), variant);
    assert!(!dir
        .path()
        .join("whittle_variants/variant_0002_code77")
        .exists());
}

// Initial sanity: a run whose unmodified input is not interesting aborts
// before touching anything.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_uninteresting_input_aborts_at_startup() {
    let original = lines(3);
    let oracle = ScriptedOracle::new(); // rejects everything

    let dir = tempfile::tempdir().unwrap();
    let mut scheduler = setup(
        &dir,
        &original,
        test_config(),
        oracle.clone() as Arc<dyn Oracle>,
    );
    let err = scheduler
        .reduce(&main_only(Arc::new(LineChunkPass::new(0))))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("not interesting"));
    assert_eq!(read_input(&dir), original);
    assert_eq!(oracle.invocations(), 1);
}

// Timeouts and runner errors resolve their ordinal without aborting the
// run.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timeout_and_runner_error_are_recoverable() {
    let original = lines(4);
    let oracle = ScriptedOracle::new();
    oracle.script(&original, Verdict::Interesting);
    oracle.script(&lines_without(4, &[0]), Verdict::Timeout);
    oracle.script(
        &lines_without(4, &[1]),
        Verdict::RunnerError("spawn failed".to_string()),
    );
    oracle.script(&lines_without(4, &[2]), Verdict::Interesting);

    let dir = tempfile::tempdir().unwrap();
    let mut scheduler = setup(
        &dir,
        &original,
        test_config(),
        oracle.clone() as Arc<dyn Oracle>,
    );
    scheduler
        .reduce(&main_only(Arc::new(LineChunkPass::new(0))))
        .await
        .unwrap();

    // Ordinals 0 and 1 failed their ways; ordinal 2 still won.
    assert_eq!(read_input(&dir), lines_without(4, &[2]));
}

// Strict mode escalates a runner error into a fatal run error.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_strict_mode_escalates_runner_errors() {
    let original = lines(3);
    let oracle = ScriptedOracle::new();
    oracle.script(&original, Verdict::Interesting);
    oracle.script(
        &lines_without(3, &[0]),
        Verdict::RunnerError("spawn failed".to_string()),
    );

    let dir = tempfile::tempdir().unwrap();
    let config = test_config().with_die_on_pass_bug(true);
    let mut scheduler = setup(&dir, &original, config, oracle.clone() as Arc<dyn Oracle>);
    let err = scheduler
        .reduce(&main_only(Arc::new(LineChunkPass::new(0))))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("failed to run"));
}

// `.orig` backups appear unless tidy mode is on.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_backup_written_unless_tidy() {
    let original = lines(3);
    let oracle = ScriptedOracle::new();
    oracle.script(&original, Verdict::Interesting);

    let dir = tempfile::tempdir().unwrap();
    let config = test_config().with_tidy(false);
    let mut scheduler = setup(&dir, &original, config, oracle.clone() as Arc<dyn Oracle>);
    scheduler
        .reduce(&main_only(Arc::new(LineChunkPass::new(0))))
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(dir.path().join("input.txt.orig")).unwrap(),
        original
    );
}
