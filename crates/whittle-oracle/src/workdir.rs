//! Scoped working directories for oracle invocations.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use whittle_core::ReductionState;

use crate::runner::OracleError;

/// A working directory owned by exactly one verification job.
///
/// The directory is removed when the workdir is dropped, on every exit
/// path, unless it was created in preserving mode — then it outlives the
/// job for post-mortem inspection.
#[derive(Debug)]
pub struct Workdir {
    // None when preserved: the TempDir guard has been dismissed.
    guard: Option<TempDir>,
    path: PathBuf,
}

impl Workdir {
    /// Create a fresh working directory. With `preserve` set, the
    /// directory is kept on disk after the job finishes.
    pub fn create(preserve: bool) -> Result<Self, OracleError> {
        let dir = tempfile::Builder::new()
            .prefix("whittle-")
            .tempdir()
            .map_err(OracleError::Workdir)?;

        if preserve {
            let path = dir.keep();
            debug!(path = %path.display(), "preserving working directory");
            Ok(Self { guard: None, path })
        } else {
            let path = dir.path().to_path_buf();
            Ok(Self {
                guard: Some(dir),
                path,
            })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write every file of the state into the directory.
    pub async fn materialize(&self, state: &ReductionState) -> Result<(), OracleError> {
        for file in state.files() {
            let target = self.path.join(&file.name);
            tokio::fs::write(&target, &file.contents)
                .await
                .map_err(OracleError::Materialize)?;
        }
        Ok(())
    }
}
