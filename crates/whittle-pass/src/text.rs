//! Bundled text-level passes.
//!
//! These are deliberately language-blind: they shrink by removing line
//! chunks and squeezing whitespace, leaving anything smarter to external
//! pass corpora.

use std::sync::Arc;

use whittle_core::{ReductionState, TestCaseFile};

use crate::traits::{Pass, PassError, PassResult, TransformOutcome};

fn split_lines(contents: &[u8]) -> Vec<&[u8]> {
    contents.split_inclusive(|&b| b == b'\n').collect()
}

/// Removes one contiguous chunk of lines per candidate.
///
/// The granularity argument selects how many chunks a file is split into:
/// `1` proposes removing a file's entire contents, `2` halves, and so on.
/// Granularity `0` is the finest setting, removing single lines. Candidates
/// are ordered by position, first file first.
pub struct LineChunkPass {
    name: String,
    granularity: usize,
}

impl LineChunkPass {
    pub fn new(granularity: usize) -> Self {
        Self {
            name: format!("lines:{}", granularity),
            granularity,
        }
    }

    /// Registry constructor. Defaults to granularity 2 when no argument is
    /// given.
    pub fn construct(arg: Option<&str>) -> PassResult<Arc<dyn Pass>> {
        let granularity = match arg {
            None => 2,
            Some(text) => text.parse::<usize>().map_err(|e| PassError::BadArgument {
                arg: text.to_string(),
                message: e.to_string(),
            })?,
        };
        Ok(Arc::new(Self::new(granularity)))
    }

    fn chunk_len(&self, line_count: usize) -> usize {
        if line_count == 0 {
            return 0;
        }
        if self.granularity == 0 {
            1
        } else {
            (line_count + self.granularity - 1) / self.granularity
        }
    }
}

impl Pass for LineChunkPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, state: &ReductionState, ordinal: usize) -> PassResult<TransformOutcome> {
        let mut remaining = ordinal;

        for (target, file) in state.files().iter().enumerate() {
            let lines = split_lines(&file.contents);
            let chunk = self.chunk_len(lines.len());
            let windows = if chunk == 0 {
                0
            } else {
                (lines.len() + chunk - 1) / chunk
            };

            if remaining >= windows {
                remaining -= windows;
                continue;
            }

            let start = remaining * chunk;
            let end = ((remaining + 1) * chunk).min(lines.len());
            let mut contents = Vec::with_capacity(file.contents.len());
            for (i, line) in lines.iter().enumerate() {
                if i < start || i >= end {
                    contents.extend_from_slice(line);
                }
            }

            let files = state
                .files()
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    if i == target {
                        TestCaseFile::new(f.name.clone(), contents.clone())
                    } else {
                        f.clone()
                    }
                })
                .collect();
            return Ok(TransformOutcome::Proposed(files));
        }

        Ok(TransformOutcome::Exhausted)
    }
}

/// Squeezes runs of blank lines down to one and strips trailing whitespace.
///
/// One candidate per file whose contents the squeeze actually changes.
pub struct BlankPass;

impl BlankPass {
    pub fn construct(_arg: Option<&str>) -> PassResult<Arc<dyn Pass>> {
        Ok(Arc::new(BlankPass))
    }

    fn squeeze(contents: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(contents.len());
        let mut previous_blank = false;

        for line in split_lines(contents) {
            let (body, terminator) = if line.ends_with(b"\r\n") {
                line.split_at(line.len() - 2)
            } else if line.ends_with(b"\n") {
                line.split_at(line.len() - 1)
            } else {
                (line, &line[line.len()..])
            };

            let trimmed_len = body
                .iter()
                .rposition(|&b| b != b' ' && b != b'\t')
                .map(|p| p + 1)
                .unwrap_or(0);
            let blank = trimmed_len == 0;

            if blank && previous_blank {
                continue;
            }
            out.extend_from_slice(&body[..trimmed_len]);
            out.extend_from_slice(terminator);
            previous_blank = blank;
        }

        out
    }
}

impl Pass for BlankPass {
    fn name(&self) -> &str {
        "blank"
    }

    fn transform(&self, state: &ReductionState, ordinal: usize) -> PassResult<TransformOutcome> {
        let mut remaining = ordinal;

        for (target, file) in state.files().iter().enumerate() {
            let squeezed = Self::squeeze(&file.contents);
            if squeezed == file.contents {
                continue;
            }
            if remaining > 0 {
                remaining -= 1;
                continue;
            }

            let files = state
                .files()
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    if i == target {
                        TestCaseFile::new(f.name.clone(), squeezed.clone())
                    } else {
                        f.clone()
                    }
                })
                .collect();
            return Ok(TransformOutcome::Proposed(files));
        }

        Ok(TransformOutcome::Exhausted)
    }
}
