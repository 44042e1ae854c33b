//! On-disk persistence of the reduction state.
//!
//! Each commit replaces the working files atomically: contents are written
//! to a sibling temp file and renamed over the target, so an interrupted
//! run never leaves a half-written test case behind.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use whittle_core::{ReductionState, TestCaseFile};

use crate::error::{EngineError, Result};

/// Maps state file names back to their on-disk paths and owns the side
/// artifacts (backups, saved variants).
pub struct StateStore {
    targets: Vec<(String, PathBuf)>,
    variant_root: PathBuf,
    variant_seq: u64,
}

impl StateStore {
    /// Read the test cases from disk, producing the store and the initial
    /// state at generation zero.
    pub fn load(paths: &[PathBuf]) -> Result<(Self, ReductionState)> {
        if paths.is_empty() {
            return Err(EngineError::NoTestCases);
        }

        let mut targets = Vec::with_capacity(paths.len());
        let mut files = Vec::with_capacity(paths.len());

        for path in paths {
            let name = path
                .file_name()
                .ok_or_else(|| EngineError::InvalidTestCase(path.display().to_string()))?
                .to_string_lossy()
                .into_owned();
            if targets.iter().any(|(existing, _)| existing == &name) {
                return Err(EngineError::DuplicateTestCase(name));
            }
            let contents = std::fs::read(path).map_err(|source| EngineError::ReadTestCase {
                path: path.display().to_string(),
                source,
            })?;
            targets.push((name.clone(), path.clone()));
            files.push(TestCaseFile::new(name, contents));
        }

        let variant_root = paths[0]
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .join("whittle_variants");

        let store = Self {
            targets,
            variant_root,
            variant_seq: 0,
        };
        Ok((store, ReductionState::new(files)))
    }

    /// Copy each test case to `<path>.orig` before the first mutation.
    pub fn backup(&self) -> Result<()> {
        for (_, path) in &self.targets {
            let mut backup: OsString = path.clone().into_os_string();
            backup.push(".orig");
            let backup = PathBuf::from(backup);
            std::fs::copy(path, &backup).map_err(|source| EngineError::Persist {
                path: backup.display().to_string(),
                source,
            })?;
            debug!(path = %backup.display(), "wrote backup");
        }
        Ok(())
    }

    /// Atomically replace every working file with the state's contents.
    pub fn persist(&self, state: &ReductionState) -> Result<()> {
        for file in state.files() {
            let Some((_, path)) = self.targets.iter().find(|(name, _)| name == &file.name)
            else {
                continue;
            };

            let mut tmp: OsString = path.clone().into_os_string();
            tmp.push(".whittle-tmp");
            let tmp = PathBuf::from(tmp);

            std::fs::write(&tmp, &file.contents).map_err(|source| EngineError::Persist {
                path: tmp.display().to_string(),
                source,
            })?;
            std::fs::rename(&tmp, path).map_err(|source| EngineError::Persist {
                path: path.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Write an also-interesting variant as a side artifact. Never touches
    /// the working files.
    pub fn save_variant(&mut self, state: &ReductionState, exit_code: i32) -> Result<PathBuf> {
        self.variant_seq += 1;
        let dir = self
            .variant_root
            .join(format!("variant_{:04}_code{}", self.variant_seq, exit_code));

        std::fs::create_dir_all(&dir).map_err(EngineError::SaveVariant)?;
        for file in state.files() {
            std::fs::write(dir.join(&file.name), &file.contents)
                .map_err(EngineError::SaveVariant)?;
        }
        info!(path = %dir.display(), "saved variant");
        Ok(dir)
    }

    /// Number of variants saved so far.
    pub fn variants_saved(&self) -> u64 {
        self.variant_seq
    }
}
