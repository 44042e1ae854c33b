//! Pass-group definitions: which passes run, in which phase.
//!
//! A group file is JSON with three ordered entry lists. Each entry names a
//! registered pass, an optional argument, and applicability flags:
//!
//! ```json
//! {
//!   "first": [ { "pass": "lines", "arg": "1" } ],
//!   "main":  [ { "pass": "lines", "arg": "2" },
//!              { "pass": "lines", "arg": "0", "slow": true } ],
//!   "last":  [ { "pass": "blank", "platforms": ["linux", "macos"] } ]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::registry::PassRegistry;
use crate::traits::{Pass, PassError};

/// Result type alias for group loading.
pub type GroupResult<T> = Result<T, GroupError>;

/// Errors raised while loading or resolving a pass group.
#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("cannot read pass group {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pass group: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Pass(#[from] PassError),

    /// Filtering left no applicable pass in any phase.
    #[error("pass group contains no applicable passes")]
    Empty,
}

/// Options that decide which group entries apply to this run.
#[derive(Debug, Clone)]
pub struct PassOptions {
    /// Include entries marked `slow`.
    pub slow: bool,
    /// Platform name matched against entry `platforms` lists.
    pub platform: String,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            slow: false,
            platform: std::env::consts::OS.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GroupFileEntry {
    pass: String,
    #[serde(default)]
    arg: Option<String>,
    #[serde(default)]
    slow: bool,
    #[serde(default)]
    platforms: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct GroupFile {
    #[serde(default)]
    first: Vec<GroupFileEntry>,
    #[serde(default)]
    main: Vec<GroupFileEntry>,
    #[serde(default)]
    last: Vec<GroupFileEntry>,
}

/// The three resolved phases of a reduction run.
///
/// `first` and `last` run each pass exactly once; `main` repeats until a
/// full sweep commits nothing.
#[derive(Debug)]
pub struct PassGroup {
    pub first: Vec<Arc<dyn Pass>>,
    pub main: Vec<Arc<dyn Pass>>,
    pub last: Vec<Arc<dyn Pass>>,
}

impl PassGroup {
    /// Load a group from a JSON file on disk.
    pub fn load(
        path: &Path,
        registry: &PassRegistry,
        options: &PassOptions,
        removed: &[String],
    ) -> GroupResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| GroupError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text, registry, options, removed)
    }

    /// Parse and resolve a group from JSON text.
    pub fn from_json(
        text: &str,
        registry: &PassRegistry,
        options: &PassOptions,
        removed: &[String],
    ) -> GroupResult<Self> {
        let file: GroupFile = serde_json::from_str(text)?;

        let group = Self {
            first: resolve_entries(&file.first, registry, options, removed)?,
            main: resolve_entries(&file.main, registry, options, removed)?,
            last: resolve_entries(&file.last, registry, options, removed)?,
        };

        if group.first.is_empty() && group.main.is_empty() && group.last.is_empty() {
            return Err(GroupError::Empty);
        }
        Ok(group)
    }

    /// Resolved pass names per phase, for `--list-passes`.
    pub fn phase_names(&self) -> (Vec<&str>, Vec<&str>, Vec<&str>) {
        (
            self.first.iter().map(|p| p.name()).collect(),
            self.main.iter().map(|p| p.name()).collect(),
            self.last.iter().map(|p| p.name()).collect(),
        )
    }
}

fn resolve_entries(
    entries: &[GroupFileEntry],
    registry: &PassRegistry,
    options: &PassOptions,
    removed: &[String],
) -> GroupResult<Vec<Arc<dyn Pass>>> {
    let mut passes = Vec::with_capacity(entries.len());

    for entry in entries {
        if removed.iter().any(|r| r == &entry.pass) {
            debug!(pass = %entry.pass, "pass removed from schedule");
            continue;
        }
        if entry.slow && !options.slow {
            debug!(pass = %entry.pass, "skipping slow pass");
            continue;
        }
        if let Some(ref platforms) = entry.platforms {
            if !platforms.iter().any(|p| p == &options.platform) {
                debug!(
                    pass = %entry.pass,
                    platform = %options.platform,
                    "pass not applicable on this platform"
                );
                continue;
            }
        }
        passes.push(registry.build(&entry.pass, entry.arg.as_deref())?);
    }

    Ok(passes)
}
