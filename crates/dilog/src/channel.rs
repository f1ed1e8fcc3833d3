//! Channel state and the record/verify operations.
//!
//! A channel is a named logical trace bound to one `<name>.dilog` file.
//! The first run in a directory finds no file and *records*; later runs
//! find the file and *verify* their own trace against it, line by line,
//! falling back to the reorder search on mismatch.
//!
//! A channel lives in exactly one mode, holds exactly one of a writer or
//! a reader, and is owned by the thread that created it.

use crate::block::{Block, BlockOwner};
use crate::error::DilogError;
use crate::journal::{Action, UnmatchedIterations};
use crate::record::{self, close_frame, is_relevant, message_line, open_frame};
use log::{debug, warn};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

/// Whether the channel writes a new trace or validates against one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Record,
    Verify,
}

/// Outcome of scanning the trace for one concrete line.
pub(crate) enum Scan {
    /// The expected line was read; `base` / `begin_line` locate where it
    /// begins.
    Found { base: u64, begin_line: u64 },
    /// A line that may not be skipped appeared instead.
    Stopped(String),
    Eof,
}

// ═══════════════════════════════════════════════════════════════════════
//  Channel
// ═══════════════════════════════════════════════════════════════════════

/// A rendered copy of the first error a channel hit. Stored so that
/// every later operation can keep raising after the original error
/// value was returned to its caller.
#[derive(Debug, Clone)]
pub(crate) struct PendingError {
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct Channel {
    pub(crate) name: String,
    pub(crate) path: PathBuf,
    mode: Mode,
    writer: Option<BufWriter<File>>,
    pub(crate) reader: Option<BufReader<File>>,
    /// Lines consumed (verify) or written (record) so far.
    pub(crate) line: u64,
    owner: ThreadId,
    pub(crate) pending: Option<PendingError>,
    /// Stack of open blocks; bottom is the channel root.
    pub(crate) blocks: Vec<Block>,
    pub(crate) journal: Vec<Action>,
    /// User blocks popped by the search, awaiting rediscovery during
    /// journal replay.
    pub(crate) rolled_back: Vec<Block>,
    pub(crate) unmatched: UnmatchedIterations,
    /// Per-prefix consumption frontier `(offset, line)`: the farthest
    /// point reached while matching iterations of a prefix out of order,
    /// restored once the last skipped candidate is retired.
    pub(crate) high_water: HashMap<String, (u64, u64)>,
}

impl Channel {
    /// Open the channel backed by `dir/<name>.dilog`.
    ///
    /// An existing non-empty file selects verify mode; otherwise the file
    /// is created (or truncated) and the channel records.
    pub fn open(dir: &Path, name: &str) -> Result<Self, DilogError> {
        let path = dir.join(format!("{name}.dilog"));
        let verify = path
            .metadata()
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);

        let (reader, writer, mode) = if verify {
            debug!("channel '{name}': verifying against {}", path.display());
            (Some(BufReader::new(File::open(&path)?)), None, Mode::Verify)
        } else {
            debug!("channel '{name}': recording to {}", path.display());
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            (None, Some(BufWriter::new(file)), Mode::Record)
        };

        Ok(Self {
            name: name.to_string(),
            path,
            mode,
            writer,
            reader,
            line: 0,
            owner: std::thread::current().id(),
            pending: None,
            blocks: vec![Block::root(name)],
            journal: Vec::new(),
            rolled_back: Vec::new(),
            unmatched: UnmatchedIterations::new(),
            high_water: HashMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Lines consumed (verify) or written (record) so far.
    pub fn current_line(&mut self, enforce_thread: bool) -> Result<u64, DilogError> {
        self.guard(enforce_thread)?;
        Ok(self.line)
    }

    // ───────────────────────────────────────────────────────────────────
    //  Error gating
    // ───────────────────────────────────────────────────────────────────

    /// Raise the pending error, if any, then enforce thread ownership.
    /// Every public operation passes through here before doing work.
    pub(crate) fn guard(&mut self, enforce_thread: bool) -> Result<(), DilogError> {
        if let Some(pending) = &self.pending {
            return Err(DilogError::Pending {
                channel: self.name.clone(),
                message: pending.message.clone(),
            });
        }
        if enforce_thread && std::thread::current().id() != self.owner {
            let err = DilogError::CrossThreadAccess {
                channel: self.name.clone(),
            };
            self.set_pending(&err);
            return Err(err);
        }
        Ok(())
    }

    /// Record the first error the channel hit; later errors keep the
    /// original. The channel is permanently unusable afterwards.
    pub(crate) fn set_pending(&mut self, err: &DilogError) {
        if self.pending.is_none() {
            warn!("channel '{}' errored: {err}", self.name);
            self.pending = Some(PendingError {
                kind: err.kind(),
                message: err.to_string(),
            });
        }
    }

    pub(crate) fn pending_kind(&self) -> Option<&'static str> {
        self.pending.as_ref().map(|p| p.kind)
    }

    // ───────────────────────────────────────────────────────────────────
    //  Shared plumbing
    // ───────────────────────────────────────────────────────────────────

    fn top(&self) -> &Block {
        self.blocks.last().expect("block stack never empty")
    }

    pub(crate) fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Consume one line, stripping the trailing newline and advancing the
    /// line counter. `None` at EOF.
    pub(crate) fn read_line(&mut self) -> Result<Option<String>, DilogError> {
        let reader = self.reader.as_mut().expect("verify mode");
        let mut buf = String::new();
        let n = reader.read_line(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        self.line += 1;
        Ok(Some(buf))
    }

    /// Byte offset at which the next line begins.
    pub(crate) fn pos(&mut self) -> Result<u64, DilogError> {
        Ok(self.reader.as_mut().expect("verify mode").stream_position()?)
    }

    /// Reposition the reader and restore the line counter recorded for
    /// that offset.
    pub(crate) fn seek_to(&mut self, offset: u64, line: u64) -> Result<(), DilogError> {
        self.reader
            .as_mut()
            .expect("verify mode")
            .seek(SeekFrom::Start(offset))?;
        self.line = line;
        Ok(())
    }

    fn write_line(&mut self, text: &str) -> Result<(), DilogError> {
        let writer = self.writer.as_mut().expect("record mode");
        writer.write_all(text.as_bytes())?;
        writer.write_all(b"\n")?;
        self.line += 1;
        Ok(())
    }

    /// Whether `line` sits at the level of `parent` itself: its closing
    /// frame or one of its own messages. Sub-block lines of any sibling
    /// branch do not qualify and are skipped while scanning for an
    /// opening frame.
    fn at_parent_level(line: &str, parent: &str) -> bool {
        let close = close_frame(parent);
        if line == close {
            return true;
        }
        line.len() >= parent.len() + 2
            && line.starts_with('[')
            && line[1..].starts_with(parent)
            && line.as_bytes()[1 + parent.len()] == b']'
    }

    /// Scan for an opening frame, skipping sibling sub-blocks; a line at
    /// the enclosing block's own level stops the scan (the enclosing
    /// iteration has moved on).
    pub(crate) fn scan_open(&mut self, expected: &str, parent: &str) -> Result<Scan, DilogError> {
        loop {
            let base = self.pos()?;
            let begin_line = self.line;
            match self.read_line()? {
                None => return Ok(Scan::Eof),
                Some(l) if l == expected => return Ok(Scan::Found { base, begin_line }),
                Some(l) if Self::at_parent_level(&l, parent) => return Ok(Scan::Stopped(l)),
                Some(_) => {}
            }
        }
    }

    /// Scan for an exact line, skipping lines irrelevant to `prefix`; a
    /// relevant non-match stops the scan.
    pub(crate) fn scan_relevant(
        &mut self,
        expected: &str,
        prefix: &str,
    ) -> Result<Scan, DilogError> {
        loop {
            let base = self.pos()?;
            let begin_line = self.line;
            match self.read_line()? {
                None => return Ok(Scan::Eof),
                Some(l) if l == expected => return Ok(Scan::Found { base, begin_line }),
                Some(l) if is_relevant(&l, prefix) => return Ok(Scan::Stopped(l)),
                Some(_) => {}
            }
        }
    }

    pub(crate) fn truncated(&mut self, expected: &str) -> DilogError {
        let err = DilogError::TruncatedTrace {
            file: self.file_name(),
            line: self.line,
            expected: expected.to_string(),
        };
        self.set_pending(&err);
        err
    }

    // ───────────────────────────────────────────────────────────────────
    //  message
    // ───────────────────────────────────────────────────────────────────

    /// Record or verify one leaf message. `text` is opaque already-
    /// formatted bytes; a trailing newline is normalized away and the
    /// payload is capped at [`record::MAX_PAYLOAD`] bytes.
    ///
    /// Returns the byte count of the normalized payload plus its newline.
    pub fn message(&mut self, text: &str, enforce_thread: bool) -> Result<usize, DilogError> {
        self.guard(enforce_thread)?;
        let payload = record::normalize_payload(text).to_string();
        match self.mode {
            Mode::Record => {
                let line = message_line(&self.top().prefix, &payload);
                self.write_line(&line)?;
                Ok(payload.len() + 1)
            }
            Mode::Verify => {
                self.verify_message(&payload)?;
                Ok(payload.len() + 1)
            }
        }
    }

    fn verify_message(&mut self, payload: &str) -> Result<(), DilogError> {
        let prefix = self.top().prefix.clone();
        let expected = message_line(&prefix, payload);
        loop {
            match self.scan_relevant(&expected, &prefix)? {
                Scan::Found { .. } => {
                    if self.blocks.len() >= 2 {
                        self.journal.push(Action::Message(payload.to_string()));
                    }
                    return Ok(());
                }
                Scan::Eof => return Err(self.truncated(&expected)),
                Scan::Stopped(line) => {
                    let at_line = self.line;
                    debug!(
                        "channel '{}': mismatch at line {at_line}, searching for a later iteration",
                        self.name
                    );
                    if self.reorder_search(Some(line.clone()), &expected)? {
                        continue;
                    }
                    return Err(DilogError::MessageMismatch {
                        file: self.file_name(),
                        line: at_line,
                        expected,
                        found: line,
                    });
                }
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────
    //  open block
    // ───────────────────────────────────────────────────────────────────

    /// Open one iteration of the named block. Invalid names are rejected
    /// before any I/O.
    pub fn open_block(&mut self, name: &str, enforce_thread: bool) -> Result<(), DilogError> {
        if name.is_empty() || name.contains('/') {
            return Err(DilogError::InvalidBlockName {
                name: name.to_string(),
            });
        }
        self.guard(enforce_thread)?;
        let parent = self.top().prefix.clone();
        let prefix = format!("{parent}/{name}");
        match self.mode {
            Mode::Record => {
                self.write_line(&open_frame(&prefix))?;
                self.blocks.push(Block::child(&parent, name, BlockOwner::User));
                Ok(())
            }
            Mode::Verify => self.verify_open(name, &prefix),
        }
    }

    fn verify_open(&mut self, name: &str, prefix: &str) -> Result<(), DilogError> {
        let expected = open_frame(prefix);
        let parent = self.top().prefix.clone();
        match self.scan_open(&expected, &parent)? {
            Scan::Found { base, begin_line } => {
                let mut block = Block::child(&parent, name, BlockOwner::User);
                block.base = base;
                block.begin_line = begin_line;
                self.journal.push(Action::EnterBlock(prefix.to_string()));
                block.replay_start = self.journal.len();
                self.blocks.push(block);
                Ok(())
            }
            Scan::Eof => Err(self.truncated(&expected)),
            Scan::Stopped(line) => {
                let err = DilogError::UnexpectedFrame {
                    file: self.file_name(),
                    line: self.line,
                    expected,
                    found: line,
                };
                self.set_pending(&err);
                Err(err)
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────
    //  close block
    // ───────────────────────────────────────────────────────────────────

    /// Close the topmost block. Runs from guard disposal, so failures are
    /// captured into the pending-error slot rather than panicking; the
    /// returned error is informational for direct callers.
    pub fn close_block(&mut self) -> Result<(), DilogError> {
        if self.blocks.len() <= 1 {
            warn!("channel '{}': close with no open block", self.name);
            return Ok(());
        }
        if self.pending.is_some() {
            // The channel is already dead; just unwind the stack.
            self.blocks.pop();
            return Ok(());
        }
        match self.mode {
            Mode::Record => {
                let prefix = self.top().prefix.clone();
                let res = self.write_line(&close_frame(&prefix));
                self.blocks.pop();
                if let Err(err) = &res {
                    self.set_pending(err);
                }
                res
            }
            Mode::Verify => self.verify_close(),
        }
    }

    fn verify_close(&mut self) -> Result<(), DilogError> {
        let prefix = self.top().prefix.clone();
        let expected = close_frame(&prefix);
        loop {
            match self.scan_relevant(&expected, &prefix)? {
                Scan::Found { .. } => {
                    let base = self.top().base;
                    self.close_bookkeeping(&prefix, base)?;
                    self.blocks.pop();
                    if self.blocks.len() >= 2 {
                        self.journal.push(Action::LeaveBlock(prefix.clone()));
                    } else {
                        // The outermost user block closed; its journal is
                        // done.
                        self.journal.clear();
                    }
                    return Ok(());
                }
                Scan::Stopped(line) => {
                    if self.reorder_search(Some(line), &expected)? {
                        continue;
                    }
                    let err = DilogError::EndOfBlockViolation {
                        file: self.file_name(),
                        line: self.line,
                        prefix,
                    };
                    self.set_pending(&err);
                    return Err(err);
                }
                Scan::Eof => {
                    let err = DilogError::EndOfBlockViolation {
                        file: self.file_name(),
                        line: self.line,
                        prefix,
                    };
                    self.set_pending(&err);
                    return Err(err);
                }
            }
        }
    }

    /// After a closing frame matched: retire the iteration's candidate
    /// entry and reposition for whatever comes next.
    ///
    /// While skipped iterations of this block remain, the reader jumps
    /// back to the earliest one so the enclosing scope can retry it, and
    /// the current position is folded into the block's consumption
    /// frontier. Once the last candidate is retired, the frontier is
    /// restored so verification resumes past everything already matched
    /// out of order.
    pub(crate) fn close_bookkeeping(&mut self, prefix: &str, base: u64) -> Result<(), DilogError> {
        let cur = self.pos()?;
        let cur_line = self.line;

        if let Some(blinks) = self.unmatched.get_mut(prefix) {
            blinks.remove(&base);
        }
        let remaining = self.unmatched.get(prefix).is_some_and(|m| !m.is_empty());
        if remaining {
            let frontier = self.high_water.entry(prefix.to_string()).or_insert((0, 0));
            if cur > frontier.0 {
                *frontier = (cur, cur_line);
            }
            let blinks = self.unmatched.get_mut(prefix).expect("checked non-empty");
            let (&first_off, &first_line) = blinks.iter().next().expect("checked non-empty");
            blinks.remove(&first_off);
            debug!(
                "channel '{}': revisiting skipped iteration of '{prefix}' at line {}",
                self.name,
                first_line + 1
            );
            self.seek_to(first_off, first_line)?;
        } else if let Some((off, line)) = self.high_water.remove(prefix) {
            if off > cur {
                self.seek_to(off, line)?;
            }
        }
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────
    //  Teardown
    // ───────────────────────────────────────────────────────────────────

    /// Flush (record) or check for unconsumed trace content (verify).
    pub fn finish(&mut self) -> Result<(), DilogError> {
        match self.mode {
            Mode::Record => {
                if let Some(writer) = self.writer.as_mut() {
                    writer.flush()?;
                }
                Ok(())
            }
            Mode::Verify => {
                if self.pending.is_some() {
                    return Ok(()); // already reported
                }
                let len = self.path.metadata()?.len();
                let pos = self.pos()?;
                if pos < len {
                    return Err(self.truncated("end of trace"));
                }
                Ok(())
            }
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writer.flush() {
                warn!("channel '{}': flush failed on drop: {err}", self.name);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Scoped block handle
// ═══════════════════════════════════════════════════════════════════════

/// Closes its block when dropped.
///
/// Close failures in verify mode are captured into the channel's
/// pending-error slot and raised by the next operation; drop itself
/// never panics.
#[must_use = "the block closes when this guard is dropped"]
#[derive(Debug)]
pub struct BlockGuard {
    channel: Arc<Mutex<Channel>>,
    prefix: String,
}

impl BlockGuard {
    pub(crate) fn new(channel: Arc<Mutex<Channel>>, prefix: String) -> Self {
        Self { channel, prefix }
    }

    /// Fully-qualified prefix of the block this guard closes.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Drop for BlockGuard {
    fn drop(&mut self) {
        let Ok(mut chan) = self.channel.lock() else {
            return;
        };
        // After a failed search the stack may already be unwound; the
        // LIFO discipline only holds on a healthy channel.
        debug_assert!(
            chan.pending.is_some()
                || chan.blocks.len() <= 1
                || chan.top().prefix == self.prefix,
            "block guards must close in LIFO order"
        );
        if let Err(err) = chan.close_block() {
            warn!("block '{}' close failed: {err}", self.prefix);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MAX_PAYLOAD;

    fn record_channel(dir: &std::path::Path) -> Channel {
        Channel::open(dir, "c").unwrap()
    }

    #[test]
    fn recording_writes_framed_lines() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut chan = record_channel(dir.path());
            chan.message("a\n", true).unwrap();
            chan.message("b\n", true).unwrap();
            chan.finish().unwrap();
        }
        let content = std::fs::read_to_string(dir.path().join("c.dilog")).unwrap();
        assert_eq!(content, "[c]a\n[c]b\n");
    }

    #[test]
    fn recording_frames_nested_blocks() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut chan = record_channel(dir.path());
            chan.open_block("outer", true).unwrap();
            chan.message("x\n", true).unwrap();
            chan.open_block("inner", true).unwrap();
            chan.message("y\n", true).unwrap();
            chan.close_block().unwrap();
            chan.close_block().unwrap();
            // The write-side line counter matches the file exactly.
            assert_eq!(chan.current_line(true).unwrap(), 6);
            chan.finish().unwrap();
        }
        let content = std::fs::read_to_string(dir.path().join("c.dilog")).unwrap();
        assert_eq!(
            content,
            "[c/outer[\n[c/outer]x\n[c/outer/inner[\n[c/outer/inner]y\n]c/outer/inner]\n]c/outer]\n"
        );
    }

    #[test]
    fn verifying_the_identical_sequence_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut chan = record_channel(dir.path());
            chan.message("a\n", true).unwrap();
            chan.message("b\n", true).unwrap();
            chan.finish().unwrap();
        }
        let mut chan = record_channel(dir.path());
        assert_eq!(chan.mode(), Mode::Verify);
        chan.message("a\n", true).unwrap();
        chan.message("b\n", true).unwrap();
        assert_eq!(chan.current_line(true).unwrap(), 2);
        chan.finish().unwrap();
    }

    #[test]
    fn root_level_mismatch_reports_line_two() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut chan = record_channel(dir.path());
            chan.message("a\n", true).unwrap();
            chan.message("b\n", true).unwrap();
            chan.finish().unwrap();
        }
        let mut chan = record_channel(dir.path());
        chan.message("a\n", true).unwrap();
        let err = chan.message("x\n", true).unwrap_err();
        match err {
            DilogError::MessageMismatch { line, .. } => assert_eq!(line, 2),
            other => panic!("expected MessageMismatch, got {other}"),
        }
    }

    #[test]
    fn message_returns_payload_bytes_plus_newline() {
        let dir = tempfile::tempdir().unwrap();
        let mut chan = record_channel(dir.path());
        assert_eq!(chan.message("abc\n", true).unwrap(), 4);
        assert_eq!(chan.message("", true).unwrap(), 1);
        assert_eq!(chan.message("no newline", true).unwrap(), 11);
    }

    #[test]
    fn oversized_messages_truncate_consistently() {
        let dir = tempfile::tempdir().unwrap();
        let long = "z".repeat(MAX_PAYLOAD + 500);
        {
            let mut chan = record_channel(dir.path());
            assert_eq!(chan.message(&long, true).unwrap(), MAX_PAYLOAD + 1);
            chan.finish().unwrap();
        }
        // The verify side truncates the same way, so the line matches.
        let mut chan = record_channel(dir.path());
        assert_eq!(chan.message(&long, true).unwrap(), MAX_PAYLOAD + 1);
        chan.finish().unwrap();
    }

    #[test]
    fn exact_cap_message_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let exact = "e".repeat(MAX_PAYLOAD);
        {
            let mut chan = record_channel(dir.path());
            chan.message(&exact, true).unwrap();
            chan.finish().unwrap();
        }
        let mut chan = record_channel(dir.path());
        chan.message(&exact, true).unwrap();
        chan.finish().unwrap();
    }

    #[test]
    fn block_names_with_slash_are_rejected_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let mut chan = record_channel(dir.path());
        assert_eq!(
            chan.open_block("a/b", true).unwrap_err().kind(),
            "invalid_block_name"
        );
        assert_eq!(
            chan.open_block("", true).unwrap_err().kind(),
            "invalid_block_name"
        );
        // The rejection left no trace content behind.
        chan.finish().unwrap();
        let content = std::fs::read_to_string(dir.path().join("c.dilog")).unwrap();
        assert!(content.is_empty());
    }

    #[test]
    fn blank_trace_content_truncates_on_first_message() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("c.dilog"), "\n").unwrap();
        let mut chan = record_channel(dir.path());
        assert_eq!(chan.mode(), Mode::Verify);
        let err = chan.message("a\n", true).unwrap_err();
        assert_eq!(err.kind(), "truncated_trace");
    }

    #[test]
    fn pending_error_gates_every_operation() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut chan = record_channel(dir.path());
            chan.message("a\n", true).unwrap();
            chan.finish().unwrap();
        }
        let mut chan = record_channel(dir.path());
        chan.message("wrong\n", true).unwrap_err();
        assert_eq!(chan.message("a\n", true).unwrap_err().kind(), "pending");
        assert_eq!(chan.open_block("L", true).unwrap_err().kind(), "pending");
        assert_eq!(chan.current_line(true).unwrap_err().kind(), "pending");
    }

    #[test]
    fn unconsumed_trace_fails_finish() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut chan = record_channel(dir.path());
            chan.message("a\n", true).unwrap();
            chan.message("b\n", true).unwrap();
            chan.finish().unwrap();
        }
        let mut chan = record_channel(dir.path());
        chan.message("a\n", true).unwrap();
        assert_eq!(chan.finish().unwrap_err().kind(), "truncated_trace");
    }

    #[test]
    fn sibling_blocks_are_skipped_while_scanning() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("c.dilog"),
            "[c/M[\n[c/M]m\n]c/M]\n[c/L[\n[c/L]l\n]c/L]\n",
        )
        .unwrap();
        // Opening L scans straight past the whole M sub-block.
        let mut chan = record_channel(dir.path());
        chan.open_block("L", true).unwrap();
        chan.message("l\n", true).unwrap();
        chan.close_block().unwrap();
        assert_eq!(chan.current_line(true).unwrap(), 6);
    }
}
