//! Offline trace inspection.
//!
//! Parses a `.dilog` file without a live channel: summary statistics,
//! an indented rendering of the block tree, and offline verification of
//! one recorded trace against another through the reorder-tolerant
//! matcher.

use crate::channel::Channel;
use crate::error::DilogError;
use crate::record::TraceRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Per-file statistics for the `dilog summary` subcommand.
#[derive(Debug, Clone, Serialize)]
pub struct TraceSummary {
    pub file: String,
    pub lines: u64,
    pub messages: u64,
    pub opens: u64,
    pub closes: u64,
    pub max_depth: usize,
    /// Iteration count per fully-qualified block prefix.
    pub iterations: BTreeMap<String, u64>,
    /// 1-based numbers of lines that are not well-formed records.
    pub malformed: Vec<u64>,
    /// Whether every open frame was balanced by a close at the same
    /// prefix, with depth never going negative.
    pub balanced: bool,
}

/// Parse `path` and collect statistics.
pub fn summarize(path: &Path) -> Result<TraceSummary, DilogError> {
    let text = fs::read_to_string(path)?;
    let mut summary = TraceSummary {
        file: path.display().to_string(),
        lines: 0,
        messages: 0,
        opens: 0,
        closes: 0,
        max_depth: 0,
        iterations: BTreeMap::new(),
        malformed: Vec::new(),
        balanced: true,
    };
    let mut stack: Vec<String> = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        summary.lines += 1;
        match TraceRecord::parse(line) {
            Some(TraceRecord::Message { .. }) => summary.messages += 1,
            Some(TraceRecord::Open { prefix }) => {
                summary.opens += 1;
                *summary.iterations.entry(prefix.clone()).or_insert(0) += 1;
                stack.push(prefix);
                summary.max_depth = summary.max_depth.max(stack.len());
            }
            Some(TraceRecord::Close { prefix }) => {
                summary.closes += 1;
                if stack.pop().as_deref() != Some(prefix.as_str()) {
                    summary.balanced = false;
                }
            }
            None => summary.malformed.push(idx as u64 + 1),
        }
    }
    if !stack.is_empty() {
        summary.balanced = false;
    }
    Ok(summary)
}

/// Render the block tree of `path` with two-space indentation. Block
/// names are shown unqualified; messages show their payload.
pub fn render_tree(path: &Path) -> Result<String, DilogError> {
    let text = fs::read_to_string(path)?;
    let mut out = String::new();
    let mut depth = 0usize;
    for line in text.lines() {
        match TraceRecord::parse(line) {
            Some(TraceRecord::Open { prefix }) => {
                let name = prefix.rsplit('/').next().unwrap_or(&prefix);
                let _ = writeln!(out, "{:indent$}{name}[", "", indent = depth * 2);
                depth += 1;
            }
            Some(TraceRecord::Close { .. }) => {
                depth = depth.saturating_sub(1);
                let _ = writeln!(out, "{:indent$}]", "", indent = depth * 2);
            }
            Some(TraceRecord::Message { payload, .. }) => {
                let _ = writeln!(out, "{:indent$}{payload}", "", indent = depth * 2);
            }
            None => {
                let _ = writeln!(out, "{:indent$}?? {line}", "", indent = depth * 2);
            }
        }
    }
    Ok(out)
}

/// Outcome of [`verify_pair`].
#[derive(Debug, Clone, Serialize)]
pub struct PairReport {
    /// Whether `candidate` is an iteration-reordering of `reference`.
    pub matched: bool,
    /// Description of the first divergence, when not matched.
    pub divergence: Option<String>,
    /// Lines of the reference trace consumed before the verdict.
    pub lines_verified: u64,
}

/// Verify that `candidate` matches `reference` up to reordered block
/// iterations, by replaying the candidate's records through a
/// verify-mode channel reading the reference.
///
/// Both files must carry the same channel name (the root of every
/// record prefix), which for a file recorded by this crate equals its
/// file stem.
pub fn verify_pair(reference: &Path, candidate: &Path) -> Result<PairReport, DilogError> {
    let channel_name = reference
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = reference.parent().unwrap_or(Path::new("."));

    let text = fs::read_to_string(candidate)?;
    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let record = TraceRecord::parse(line).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{}: malformed record at line {}", candidate.display(), idx + 1),
            )
        })?;
        records.push(record);
    }
    if let Some(first) = records.first() {
        let root = first.prefix().split('/').next().unwrap_or("");
        if root != channel_name {
            return Ok(PairReport {
                matched: false,
                divergence: Some(format!(
                    "channel name mismatch: reference is '{channel_name}', candidate is '{root}'"
                )),
                lines_verified: 0,
            });
        }
    }

    let mut chan = Channel::open(dir, &channel_name)?;
    let mut outcome = Ok(());
    for record in &records {
        outcome = match record {
            TraceRecord::Message { payload, .. } => chan.message(payload, false).map(|_| ()),
            TraceRecord::Open { prefix } => {
                let name = prefix.rsplit('/').next().unwrap_or(prefix);
                chan.open_block(name, false)
            }
            TraceRecord::Close { .. } => chan.close_block(),
        };
        if outcome.is_err() {
            break;
        }
    }
    let lines_verified = chan.current_line(false).unwrap_or(0);
    match outcome {
        Ok(()) => Ok(PairReport {
            matched: true,
            divergence: None,
            lines_verified,
        }),
        Err(err) => Ok(PairReport {
            matched: false,
            divergence: Some(err.to_string()),
            lines_verified,
        }),
    }
}
