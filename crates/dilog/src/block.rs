//! Block state.
//!
//! A block is one lexical loop-body instance. The channel keeps a stack
//! of open blocks whose bottom element is the channel root; for any two
//! stacked blocks A below B, B's prefix is A's prefix plus `/name`.

/// Who owns a block on the stack.
///
/// User blocks are closed by a [`BlockGuard`](crate::channel::BlockGuard)
/// going out of scope. Synthesized blocks are created by the reorder
/// search while replaying the journal into a candidate iteration, and are
/// popped by the search itself. The root is never popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOwner {
    Root,
    User,
    Synthesized,
}

/// One open block on the channel's stack.
#[derive(Debug, Clone)]
pub struct Block {
    /// Unqualified name, e.g. `"myloop"`. Equals the channel name for the
    /// root block.
    pub name: String,
    /// Fully-qualified prefix: `parentPrefix + "/" + name`.
    pub prefix: String,
    /// File offset at which this iteration's opening frame line begins
    /// (verify mode only; unused while recording).
    pub base: u64,
    /// Line counter value at `base`.
    pub begin_line: u64,
    /// Index into the channel journal of the first action inside this
    /// iteration.
    pub replay_start: usize,
    pub owner: BlockOwner,
}

impl Block {
    /// The channel root: prefix equals the channel name.
    pub fn root(channel: &str) -> Self {
        Self {
            name: channel.to_string(),
            prefix: channel.to_string(),
            base: 0,
            begin_line: 0,
            replay_start: 0,
            owner: BlockOwner::Root,
        }
    }

    /// A child of `parent_prefix`.
    pub fn child(parent_prefix: &str, name: &str, owner: BlockOwner) -> Self {
        Self {
            name: name.to_string(),
            prefix: format!("{parent_prefix}/{name}"),
            base: 0,
            begin_line: 0,
            replay_start: 0,
            owner,
        }
    }
}
