//! Replay journal.
//!
//! The journal records every action the verifier has accepted since
//! entering the outermost currently-open user block, and is cleared when
//! that block closes. During reorder search it is replayed against
//! candidate iterations to check that partial progress made in the
//! current iteration also holds there.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

/// One accepted verifier action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// An opening frame was matched for this fully-qualified prefix.
    EnterBlock(String),
    /// A closing frame was matched for this fully-qualified prefix.
    LeaveBlock(String),
    /// A leaf message with this normalized payload was matched.
    Message(String),
}

/// Per-prefix map of skipped iterations that remain candidates for a
/// later match: file offset of the iteration's opening frame → line
/// counter at that offset. Candidates are revisited in ascending file
/// offset order.
pub type UnmatchedIterations = HashMap<String, BTreeMap<u64, u64>>;

/// Render the journal as an indented tree for the divergence diagnostic.
///
/// Block entries are annotated with the file line numbers at which
/// skipped iterations of that block remain unmatched.
pub fn render_replay_tree(journal: &[Action], unmatched: &UnmatchedIterations) -> String {
    let mut out = String::new();
    let mut depth = 0usize;
    for action in journal {
        match action {
            Action::EnterBlock(prefix) => {
                let name = prefix.rsplit('/').next().unwrap_or(prefix);
                let lines = unmatched
                    .get(prefix)
                    .filter(|m| !m.is_empty())
                    .map(|m| {
                        let list: Vec<String> =
                            m.values().map(|line| (line + 1).to_string()).collect();
                        format!("  (unmatched iterations at lines {})", list.join(", "))
                    })
                    .unwrap_or_default();
                let _ = writeln!(out, "{:indent$}{name}[{lines}", "", indent = depth * 2);
                depth += 1;
            }
            Action::LeaveBlock(_) => {
                depth = depth.saturating_sub(1);
                let _ = writeln!(out, "{:indent$}]", "", indent = depth * 2);
            }
            Action::Message(text) => {
                let _ = writeln!(out, "{:indent$}{text}", "", indent = depth * 2);
            }
        }
    }
    out
}
