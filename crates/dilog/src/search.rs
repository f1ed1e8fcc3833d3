//! Reorder search.
//!
//! Invoked when a verify expectation hits a relevant line that does not
//! match. The engine abandons the current iteration of the innermost
//! open block, remembers it as a candidate for a later retry, and walks
//! forward through the remaining sibling iterations of enclosing blocks
//! looking for one that satisfies everything already accepted in the
//! current outermost iteration (the journal) — at which point the caller
//! re-attempts its original expectation from the new position.
//!
//! The algorithm is naturally recursive: rejecting a candidate recurses
//! with the offending line, and running out of iterations at one nesting
//! level pops a block and recurses one level up. Both calls are tail
//! calls, so the engine here is a single loop; `last_line` carries the
//! offending line between rounds.

use crate::block::{Block, BlockOwner};
use crate::channel::{Channel, Scan};
use crate::error::DilogError;
use crate::journal::{render_replay_tree, Action};
use crate::record::{close_frame, message_line, open_frame};
use log::{debug, error};
use std::fmt::Write as _;

/// Outcome of replaying the journal into a candidate iteration.
enum Replay {
    Done,
    Mismatch(String),
    Eof,
}

impl Channel {
    /// Reposition the channel so the failed expectation can be retried
    /// against a later iteration of an enclosing block.
    ///
    /// Returns `Ok(false)` when the outermost open user block has no more
    /// iterations; the divergence diagnostic has then been emitted and
    /// the pending error set.
    pub(crate) fn reorder_search(
        &mut self,
        last: Option<String>,
        orig_expected: &str,
    ) -> Result<bool, DilogError> {
        let mut last_line = last;
        loop {
            if self.blocks.len() <= 1 {
                self.fail_search(orig_expected, last_line.as_deref());
                return Ok(false);
            }
            let (prefix, base, begin_line) = {
                let top = self.blocks.last().expect("depth checked");
                (top.prefix.clone(), top.base, top.begin_line)
            };
            debug!(
                "channel '{}': abandoning iteration of '{prefix}' begun at line {}",
                self.name,
                begin_line + 1
            );

            // The abandoned iteration is now a candidate to retry from an
            // outer level. Candidates recorded for blocks nested inside it
            // die with it; they are rediscovered by scanning if the
            // iteration is ever re-entered.
            self.purge_descendants(&prefix, base);
            self.unmatched
                .entry(prefix.clone())
                .or_default()
                .insert(base, begin_line);

            // Finish consuming the failed iteration's tail. Nested closes
            // carry longer prefixes, so the first exact match is ours.
            let closing = close_frame(&prefix);
            if last_line.as_deref() != Some(closing.as_str()) {
                loop {
                    match self.read_line()? {
                        None => {
                            self.fail_search(orig_expected, None);
                            return Ok(false);
                        }
                        Some(l) if l == closing => break,
                        Some(_) => {}
                    }
                }
            }

            // Re-enter the earliest previously skipped iteration after the
            // abandoned one; with none on file, the next candidate starts
            // at the current position.
            let target = self
                .unmatched
                .get(&prefix)
                .and_then(|m| m.range(base + 1..).next())
                .map(|(&off, &line)| (off, line));
            if let Some((off, line)) = target {
                let cur = self.pos()?;
                if off != cur {
                    self.seek_to(off, line)?;
                } else {
                    self.line = line;
                }
            }

            // Anchor the block at the candidate's opening frame. A line at
            // the enclosing level instead means this level has no more
            // iterations: drop down one block and keep searching.
            let parent_prefix = self.blocks[self.blocks.len() - 2].prefix.clone();
            let opening = open_frame(&prefix);
            match self.scan_open(&opening, &parent_prefix)? {
                Scan::Found { base, begin_line } => {
                    let top = self.blocks.last_mut().expect("depth checked");
                    top.base = base;
                    top.begin_line = begin_line;
                }
                outcome @ (Scan::Stopped(_) | Scan::Eof) => {
                    let popped = self.blocks.pop().expect("depth checked");
                    if popped.owner == BlockOwner::User {
                        self.rolled_back.push(popped);
                    }
                    last_line = match outcome {
                        Scan::Stopped(l) => Some(l),
                        _ => None,
                    };
                    continue;
                }
            }

            // Replay everything already accepted in this iteration against
            // the candidate; a mismatch rejects the candidate and loops.
            match self.replay_journal()? {
                Replay::Done => {
                    debug_assert!(self.rolled_back.is_empty());
                    debug_assert!(self
                        .blocks
                        .iter()
                        .all(|b| b.owner != BlockOwner::Synthesized));
                    debug!(
                        "channel '{}': resuming at line {} after reorder",
                        self.name,
                        self.line + 1
                    );
                    return Ok(true);
                }
                Replay::Mismatch(l) => last_line = Some(l),
                Replay::Eof => last_line = None,
            }
        }
    }

    /// Drop candidates (and consumption frontiers) recorded for blocks
    /// nested inside the iteration of `prefix` that begins at `base`.
    fn purge_descendants(&mut self, prefix: &str, base: u64) {
        let subtree = format!("{prefix}/");
        self.unmatched.retain(|key, entries| {
            if key.starts_with(&subtree) {
                entries.retain(|&off, _| off < base);
                !entries.is_empty()
            } else {
                true
            }
        });
        self.high_water.retain(|key, _| !key.starts_with(&subtree));
    }

    /// Replay the journal from the top block's `replay_start` through its
    /// end against the candidate iteration under the reader.
    ///
    /// Journal enter/leave actions shift the active prefix by pushing and
    /// popping the block stack itself: a still-open user block waiting on
    /// the rolled-back stack is rediscovered when its enter action comes
    /// up at the right journal index; every other enter synthesizes an
    /// engine-owned block that its paired leave destroys. Leave actions
    /// run the same close bookkeeping as live closes, so a candidate with
    /// internally reordered sub-iterations is walked the same way the
    /// live verifier walked the original.
    fn replay_journal(&mut self) -> Result<Replay, DilogError> {
        let start = self.blocks.last().expect("depth checked").replay_start;
        for idx in start..self.journal.len() {
            let action = self.journal[idx].clone();
            let active = self.blocks.last().expect("depth checked").prefix.clone();
            match action {
                Action::Message(m) => {
                    let expected = message_line(&active, &m);
                    match self.scan_relevant(&expected, &active)? {
                        Scan::Found { .. } => {}
                        Scan::Stopped(l) => return Ok(Replay::Mismatch(l)),
                        Scan::Eof => return Ok(Replay::Eof),
                    }
                }
                Action::EnterBlock(p) => {
                    let expected = open_frame(&p);
                    match self.scan_open(&expected, &active)? {
                        Scan::Found { base, begin_line } => {
                            let rediscovered = self
                                .rolled_back
                                .last()
                                .is_some_and(|b| b.prefix == p && b.replay_start == idx + 1);
                            let mut block = if rediscovered {
                                self.rolled_back.pop().expect("just checked")
                            } else {
                                let name = p.rsplit('/').next().unwrap_or(&p).to_string();
                                Block {
                                    name,
                                    prefix: p.clone(),
                                    base: 0,
                                    begin_line: 0,
                                    replay_start: idx + 1,
                                    owner: BlockOwner::Synthesized,
                                }
                            };
                            block.base = base;
                            block.begin_line = begin_line;
                            self.blocks.push(block);
                        }
                        Scan::Stopped(l) => return Ok(Replay::Mismatch(l)),
                        Scan::Eof => return Ok(Replay::Eof),
                    }
                }
                Action::LeaveBlock(p) => {
                    let expected = close_frame(&p);
                    match self.scan_relevant(&expected, &p)? {
                        Scan::Found { .. } => {
                            let top = self.blocks.pop().expect("enter precedes leave");
                            debug_assert_eq!(top.owner, BlockOwner::Synthesized);
                            debug_assert_eq!(top.prefix, p);
                            self.close_bookkeeping(&p, top.base)?;
                        }
                        Scan::Stopped(l) => return Ok(Replay::Mismatch(l)),
                        Scan::Eof => return Ok(Replay::Eof),
                    }
                }
            }
        }
        Ok(Replay::Done)
    }

    /// Emit the divergence diagnostic and poison the channel. Reached
    /// once per channel, when the search runs out of candidates.
    fn fail_search(&mut self, expected: &str, found: Option<&str>) {
        const SEP: &str = "-------dilog------dilog------dilog-------";
        let file = self.file_name();
        let found_text = found.unwrap_or("<end of file>");

        let mut msg = String::new();
        let _ = writeln!(msg, "{SEP}");
        let _ = writeln!(msg, "dilog divergence in {file}, line {}", self.line.max(1));
        let _ = writeln!(msg, "    expected: {expected}");
        let _ = writeln!(msg, "   but found: {found_text}");
        let _ = writeln!(msg, "{SEP}");
        let tree = render_replay_tree(&self.journal, &self.unmatched);
        if !tree.is_empty() {
            let _ = writeln!(msg, "replay journal of the abandoned iteration:");
            let _ = write!(msg, "{tree}");
        }
        let _ = write!(msg, "{SEP}");
        eprintln!("{msg}");
        error!(
            "channel '{}': search exhausted, expected {expected:?}",
            self.name
        );

        let err = DilogError::SearchExhausted {
            file,
            line: self.line,
            expected: expected.to_string(),
            found: found_text.to_string(),
        };
        self.set_pending(&err);
    }
}

#[cfg(test)]
mod tests {
    use crate::registry::{Dilog, ThreadGuard};
    use crate::DilogError;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> Dilog {
        Dilog::with_base(dir.path())
    }

    /// One loop writing `count` iterations of block `L` on channel `c`.
    fn record_loop(reg: &Dilog, count: u32) {
        for i in 0..count {
            let _scope = reg.block("c", "L").unwrap();
            reg.message("c", &format!("i={i}\n")).unwrap();
        }
        assert!(reg.shutdown().is_empty());
    }

    #[test]
    fn identical_rerun_verifies() {
        let dir = tempfile::tempdir().unwrap();
        record_loop(&registry(&dir), 3);

        let reg = registry(&dir);
        for i in 0..3 {
            let _scope = reg.block("c", "L").unwrap();
            reg.message("c", &format!("i={i}\n")).unwrap();
        }
        assert_eq!(reg.current_line("c").unwrap(), 9);
        assert!(reg.shutdown().is_empty());
    }

    #[test]
    fn reordered_iterations_verify() {
        let dir = tempfile::tempdir().unwrap();
        record_loop(&registry(&dir), 3);

        let reg = registry(&dir);
        for i in [2, 0, 1] {
            let _scope = reg.block("c", "L").unwrap();
            reg.message("c", &format!("i={i}\n")).unwrap();
        }
        // All nine recorded lines are consumed despite the permutation.
        assert_eq!(reg.current_line("c").unwrap(), 9);
        assert!(reg.shutdown().is_empty());
    }

    #[test]
    fn divergent_iteration_content_fails() {
        let dir = tempfile::tempdir().unwrap();
        record_loop(&registry(&dir), 3);

        let reg = registry(&dir);
        {
            let _scope = reg.block("c", "L").unwrap();
            reg.message("c", "i=0\n").unwrap();
        }
        let _scope = reg.block("c", "L").unwrap();
        let err = reg.message("c", "i=9\n").unwrap_err();
        match err {
            DilogError::MessageMismatch {
                line,
                expected,
                found,
                ..
            } => {
                // Iterations 1 and 2 were both tried and rejected; the
                // mismatch reports the last rejection point.
                assert_eq!(line, 8);
                assert_eq!(expected, "[c/L]i=9");
                assert_eq!(found, "[c/L]i=2");
            }
            other => panic!("expected MessageMismatch, got {other}"),
        }
        // The search poisoned the channel; everything keeps failing.
        let err = reg.get("c", ThreadGuard::Enforced).unwrap_err();
        assert_eq!(err.kind(), "pending");
    }

    #[test]
    fn nested_reorder_verifies() {
        let dir = tempfile::tempdir().unwrap();
        {
            let reg = registry(&dir);
            for o in 0..2 {
                let _outer = reg.block("c", "O").unwrap();
                for i in 0..2 {
                    let _inner = reg.block("c", "I").unwrap();
                    reg.message("c", &format!("o{o}_i{i}\n")).unwrap();
                }
            }
            assert!(reg.shutdown().is_empty());
        }

        let reg = registry(&dir);
        for o in [1, 0] {
            let _outer = reg.block("c", "O").unwrap();
            for i in [1, 0] {
                let _inner = reg.block("c", "I").unwrap();
                reg.message("c", &format!("o{o}_i{i}\n")).unwrap();
            }
        }
        assert_eq!(reg.current_line("c").unwrap(), 16);
        assert!(reg.shutdown().is_empty());
    }

    #[test]
    fn outer_swap_replays_completed_inner_blocks() {
        let dir = tempfile::tempdir().unwrap();
        {
            let reg = registry(&dir);
            for tail in 1..=2 {
                let _outer = reg.block("c", "O").unwrap();
                {
                    let _inner = reg.block("c", "I").unwrap();
                    reg.message("c", "a\n").unwrap();
                }
                reg.message("c", &format!("tail={tail}\n")).unwrap();
            }
            assert!(reg.shutdown().is_empty());
        }

        // Both outer iterations begin identically; the divergence only
        // shows at the tail message, after a full inner block was
        // journaled — the search must replay that block into the other
        // outer iteration.
        let reg = registry(&dir);
        for tail in [2, 1] {
            let _outer = reg.block("c", "O").unwrap();
            {
                let _inner = reg.block("c", "I").unwrap();
                reg.message("c", "a\n").unwrap();
            }
            reg.message("c", &format!("tail={tail}\n")).unwrap();
        }
        assert_eq!(reg.current_line("c").unwrap(), 12);
        assert!(reg.shutdown().is_empty());
    }

    #[test]
    fn outer_swap_with_inner_swap_inside_replay() {
        let dir = tempfile::tempdir().unwrap();
        {
            let reg = registry(&dir);
            for (tail, inners) in [(1, ["p", "q"]), (2, ["q", "p"])] {
                let _outer = reg.block("c", "O").unwrap();
                for payload in inners {
                    let _inner = reg.block("c", "I").unwrap();
                    reg.message("c", &format!("{payload}\n")).unwrap();
                }
                reg.message("c", &format!("tail={tail}\n")).unwrap();
            }
            assert!(reg.shutdown().is_empty());
        }

        // Outer iterations swapped AND the inner iterations swapped
        // within each: the journal replay itself must walk the candidate
        // outer iteration's inner blocks out of order.
        let reg = registry(&dir);
        for (tail, inners) in [(2, ["p", "q"]), (1, ["q", "p"])] {
            let _outer = reg.block("c", "O").unwrap();
            for payload in inners {
                let _inner = reg.block("c", "I").unwrap();
                reg.message("c", &format!("{payload}\n")).unwrap();
            }
            reg.message("c", &format!("tail={tail}\n")).unwrap();
        }
        assert_eq!(reg.current_line("c").unwrap(), 18);
        assert!(reg.shutdown().is_empty());
    }

    #[test]
    fn extra_iteration_fails_at_end_of_trace() {
        let dir = tempfile::tempdir().unwrap();
        record_loop(&registry(&dir), 2);

        let reg = registry(&dir);
        for i in 0..2 {
            let _scope = reg.block("c", "L").unwrap();
            reg.message("c", &format!("i={i}\n")).unwrap();
        }
        let err = reg.block("c", "L").unwrap_err();
        assert_eq!(err.kind(), "truncated_trace");
    }

    #[test]
    fn extra_iteration_with_trailing_content_is_unexpected_frame() {
        let dir = tempfile::tempdir().unwrap();
        {
            let reg = registry(&dir);
            for i in 0..2 {
                let _scope = reg.block("c", "L").unwrap();
                reg.message("c", &format!("i={i}\n")).unwrap();
            }
            reg.message("c", "done\n").unwrap();
            assert!(reg.shutdown().is_empty());
        }

        let reg = registry(&dir);
        for i in 0..2 {
            let _scope = reg.block("c", "L").unwrap();
            reg.message("c", &format!("i={i}\n")).unwrap();
        }
        let err = reg.block("c", "L").unwrap_err();
        assert_eq!(err.kind(), "unexpected_frame");
    }

    #[test]
    fn missing_iteration_poisons_the_channel() {
        let dir = tempfile::tempdir().unwrap();
        record_loop(&registry(&dir), 3);

        // Verify runs only two of the three recorded iterations, then
        // emits a root message the trace does not have at that point.
        let reg = registry(&dir);
        for i in [2, 1] {
            let _scope = reg.block("c", "L").unwrap();
            reg.message("c", &format!("i={i}\n")).unwrap();
        }
        let err = reg.message("c", "after\n").unwrap_err();
        assert_eq!(err.kind(), "message_mismatch");
    }

    #[test]
    fn divergence_inside_nested_block_reports_close_failure_as_pending() {
        let dir = tempfile::tempdir().unwrap();
        record_loop(&registry(&dir), 2);

        let reg = registry(&dir);
        let handle = reg.get("c", ThreadGuard::Enforced).unwrap();
        {
            let _scope = handle.block("L").unwrap();
            let err = handle.message("x=1\n").unwrap_err();
            assert_eq!(err.kind(), "message_mismatch");
            // The guard drop must not panic on the poisoned channel.
        }
        assert_eq!(handle.pending_kind(), Some("search_exhausted"));
    }
}
