//! Oracle runner: subprocess execution of the interestingness test.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use whittle_core::{ReductionState, Verdict};

use crate::workdir::Workdir;

/// Result type alias for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;

/// Errors that abort a verification job before the oracle ran.
///
/// Launch failures of the oracle itself are not here: they resolve to
/// [`Verdict::RunnerError`] so the engine can apply its strict-mode
/// policy per candidate.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The interestingness test does not exist.
    #[error("interestingness test not found: {path}")]
    NotFound { path: String },

    /// The interestingness test is not an executable file.
    #[error("interestingness test is not executable: {path}")]
    NotExecutable { path: String },

    /// A working directory could not be created. Resource exhaustion,
    /// fatal to the run.
    #[error("cannot create working directory: {0}")]
    Workdir(#[source] std::io::Error),

    /// Candidate files could not be written into the working directory.
    #[error("cannot materialize candidate: {0}")]
    Materialize(#[source] std::io::Error),
}

/// The verification seam the engine depends on.
///
/// The production implementation is [`OracleRunner`]; tests script their
/// own oracles against the same trait.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Stable identity of this oracle, mixed into content-cache keys.
    fn identity(&self) -> &str;

    /// Test one candidate state and classify the outcome.
    async fn verify(&self, state: &ReductionState) -> Result<Verdict>;
}

/// Runs the interestingness test as a subprocess.
///
/// Each invocation materializes the candidate into a fresh working
/// directory, runs the test with that directory as cwd and the file names
/// as arguments, and classifies the exit status: 0 is interesting, the
/// configured "also interesting" code saves a variant, anything else is
/// not interesting. Exceeding the wall-clock budget kills the process.
#[derive(Debug, Clone)]
pub struct OracleRunner {
    executable: PathBuf,
    identity: String,
    timeout: Duration,
    also_interesting: Option<i32>,
    save_temps: bool,
}

impl OracleRunner {
    /// Create a runner for the given test executable. Relative paths are
    /// resolved against the current directory so the test still resolves
    /// when invoked from per-job working directories.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        let executable = executable.into();
        let executable = if executable.is_absolute() {
            executable
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&executable))
                .unwrap_or(executable)
        };
        let identity = executable.display().to_string();
        Self {
            executable,
            identity,
            timeout: Duration::from_secs(300),
            also_interesting: None,
            save_temps: false,
        }
    }

    /// Set the wall-clock budget for one invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the exit code that marks a variant as worth saving.
    pub fn with_also_interesting(mut self, exit_code: Option<i32>) -> Self {
        self.also_interesting = exit_code;
        self
    }

    /// Keep working directories on disk after each job.
    pub fn with_save_temps(mut self, save_temps: bool) -> Self {
        self.save_temps = save_temps;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Verify the test exists and is executable before the run begins.
    pub fn check_availability(&self) -> Result<()> {
        let metadata = std::fs::metadata(&self.executable).map_err(|_| OracleError::NotFound {
            path: self.identity.clone(),
        })?;

        if !metadata.is_file() {
            return Err(OracleError::NotExecutable {
                path: self.identity.clone(),
            });
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o111 == 0 {
                return Err(OracleError::NotExecutable {
                    path: self.identity.clone(),
                });
            }
        }

        Ok(())
    }

    fn build_command(&self, workdir: &Path, state: &ReductionState) -> Command {
        let mut cmd = Command::new(&self.executable);
        for file in state.files() {
            cmd.arg(&file.name);
        }
        cmd.current_dir(workdir);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    fn classify_exit(&self, code: i32) -> Verdict {
        match code {
            0 => Verdict::Interesting,
            c if Some(c) == self.also_interesting => Verdict::AlsoInteresting(c),
            _ => Verdict::NotInteresting,
        }
    }
}

#[async_trait]
impl Oracle for OracleRunner {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn verify(&self, state: &ReductionState) -> Result<Verdict> {
        let workdir = Workdir::create(self.save_temps)?;
        workdir.materialize(state).await?;

        let mut cmd = self.build_command(workdir.path(), state);
        trace!(workdir = %workdir.path().display(), "running interestingness test");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Ok(Verdict::RunnerError(format!(
                    "failed to launch {}: {}",
                    self.identity, e
                )));
            }
        };

        match timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                // A signal-terminated test has no exit code; treat it as an
                // ordinary rejection.
                let code = status.code().unwrap_or(-1);
                let verdict = self.classify_exit(code);
                trace!(code, %verdict, "interestingness test finished");
                Ok(verdict)
            }
            Ok(Err(e)) => Ok(Verdict::RunnerError(format!(
                "failed to wait for {}: {}",
                self.identity, e
            ))),
            Err(_) => {
                warn!(timeout = ?self.timeout, "interestingness test timed out; killing it");
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "could not kill timed-out test");
                }
                Ok(Verdict::Timeout)
            }
        }
    }
}
