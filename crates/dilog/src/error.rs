//! Error taxonomy for channel operations.
//!
//! Errors are terminal per channel: once an operation fails (or a block
//! close captures a failure into the pending-error slot), every later
//! operation on that channel raises before doing any work.

use thiserror::Error;

/// Errors raised by channel operations or captured as pending errors.
#[derive(Error, Debug)]
pub enum DilogError {
    /// Channel touched from a thread other than the one that created it.
    #[error("channel '{channel}' is owned by another thread")]
    CrossThreadAccess { channel: String },

    /// Message verification failed after exhaustive search.
    #[error("message mismatch in {file}, line {line}: expected {expected:?}, found {found:?}")]
    MessageMismatch {
        file: String,
        line: u64,
        expected: String,
        found: String,
    },

    /// A block-open or block-close scan read a relevant line that is
    /// neither the expected frame nor a skippable sibling.
    #[error("unexpected frame in {file}, line {line}: expected {expected:?}, found {found:?}")]
    UnexpectedFrame {
        file: String,
        line: u64,
        expected: String,
        found: String,
    },

    /// A block close could not find its closing frame. Reported through
    /// the pending-error slot because closes run on drop.
    #[error("end of block '{prefix}' not matched in {file}, line {line}")]
    EndOfBlockViolation {
        file: String,
        line: u64,
        prefix: String,
    },

    /// EOF while expecting more trace content.
    #[error("trace {file} truncated at line {line}: expected {expected:?}")]
    TruncatedTrace {
        file: String,
        line: u64,
        expected: String,
    },

    /// Reorder search ran out of candidate iterations for the operation
    /// that triggered it.
    #[error("no matching iteration in {file}, line {line}: expected {expected:?}, found {found:?}")]
    SearchExhausted {
        file: String,
        line: u64,
        expected: String,
        found: String,
    },

    /// A previously captured error, re-raised by a later operation.
    #[error("channel '{channel}' has a pending error: {message}")]
    Pending { channel: String, message: String },

    /// Block names must be non-empty and must not contain '/'.
    #[error("invalid block name {name:?}")]
    InvalidBlockName { name: String },

    /// Underlying file read/write failed.
    #[error("trace I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DilogError {
    /// Short kind tag, stable across message wording changes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CrossThreadAccess { .. } => "cross_thread_access",
            Self::MessageMismatch { .. } => "message_mismatch",
            Self::UnexpectedFrame { .. } => "unexpected_frame",
            Self::EndOfBlockViolation { .. } => "end_of_block_violation",
            Self::TruncatedTrace { .. } => "truncated_trace",
            Self::SearchExhausted { .. } => "search_exhausted",
            Self::Pending { .. } => "pending",
            Self::InvalidBlockName { .. } => "invalid_block_name",
            Self::Io(_) => "io",
        }
    }
}
