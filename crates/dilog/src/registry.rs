//! Channel registry.
//!
//! Maps channel names to channel instances and constructs each channel
//! in record or verify mode on first touch. The registry mutex is held
//! only for lookup and insertion; channel operations run under the
//! channel's own lock, which is uncontended in the intended
//! one-thread-per-channel usage.
//!
//! The registry is an explicit value so tests and tools can run several
//! side by side with different trace directories; [`crate::global`]
//! exposes the process-wide instance behind the free functions.

use crate::channel::{BlockGuard, Channel, Mode};
use crate::error::DilogError;
use log::debug;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Whether channel access checks the owning thread.
///
/// The relaxed form is for end-of-process cleanup paths that legitimately
/// run on a different thread; it skips the check only, correctness under
/// concurrent use stays the caller's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadGuard {
    Enforced,
    Relaxed,
}

// ═══════════════════════════════════════════════════════════════════════
//  Registry
// ═══════════════════════════════════════════════════════════════════════

/// A set of channels sharing one trace directory.
pub struct Dilog {
    base: PathBuf,
    channels: Mutex<HashMap<String, Arc<Mutex<Channel>>>>,
}

impl Dilog {
    /// Registry writing and reading traces in the current directory.
    pub fn new() -> Self {
        Self::with_base(PathBuf::from("."))
    }

    /// Registry bound to an explicit trace directory.
    pub fn with_base(dir: impl Into<PathBuf>) -> Self {
        Self {
            base: dir.into(),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// The channel for `name`, created on first call.
    ///
    /// Creation decides the mode: an existing non-empty `<name>.dilog`
    /// selects verify, anything else starts a recording. With
    /// [`ThreadGuard::Enforced`], access from a thread other than the
    /// creating one fails with `CrossThreadAccess` and poisons the
    /// channel.
    pub fn get(&self, name: &str, guard: ThreadGuard) -> Result<ChannelHandle, DilogError> {
        let chan = {
            let mut map = self.channels.lock().unwrap();
            match map.get(name) {
                Some(chan) => Arc::clone(chan),
                None => {
                    let chan = Arc::new(Mutex::new(Channel::open(&self.base, name)?));
                    map.insert(name.to_string(), Arc::clone(&chan));
                    chan
                }
            }
        };
        let enforce = guard == ThreadGuard::Enforced;
        chan.lock().unwrap().guard(enforce)?;
        Ok(ChannelHandle { chan, enforce })
    }

    /// Record or verify one message on `channel`. See
    /// [`ChannelHandle::message`].
    pub fn message(&self, channel: &str, text: &str) -> Result<usize, DilogError> {
        self.get(channel, ThreadGuard::Enforced)?.message(text)
    }

    /// Open one block iteration on `channel`. See [`ChannelHandle::block`].
    pub fn block(&self, channel: &str, name: &str) -> Result<BlockGuard, DilogError> {
        self.get(channel, ThreadGuard::Enforced)?.block(name)
    }

    /// Lines consumed or written so far on `channel`.
    pub fn current_line(&self, channel: &str) -> Result<u64, DilogError> {
        self.get(channel, ThreadGuard::Enforced)?.current_line()
    }

    /// Destroy all channels: recorders flush, verifiers check that their
    /// trace was fully consumed. Returns one error per channel that ended
    /// badly.
    pub fn shutdown(&self) -> Vec<DilogError> {
        let drained: Vec<(String, Arc<Mutex<Channel>>)> = {
            let mut map = self.channels.lock().unwrap();
            map.drain().collect()
        };
        let mut errors = Vec::new();
        for (name, chan) in drained {
            debug!("shutting down channel '{name}'");
            if let Err(err) = chan.lock().unwrap().finish() {
                errors.push(err);
            }
        }
        errors
    }
}

impl Default for Dilog {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Channel handle
// ═══════════════════════════════════════════════════════════════════════

/// A cheap, cloneable reference to one channel.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    chan: Arc<Mutex<Channel>>,
    enforce: bool,
}

impl ChannelHandle {
    /// Record or verify one leaf message; `text` is already-formatted
    /// opaque bytes. Returns the byte count of the normalized payload
    /// plus its newline.
    pub fn message(&self, text: &str) -> Result<usize, DilogError> {
        self.chan.lock().unwrap().message(text, self.enforce)
    }

    /// Open one iteration of the named block; the returned guard closes
    /// it on drop.
    pub fn block(&self, name: &str) -> Result<BlockGuard, DilogError> {
        let prefix = {
            let mut chan = self.chan.lock().unwrap();
            chan.open_block(name, self.enforce)?;
            chan.blocks.last().expect("just pushed").prefix.clone()
        };
        Ok(BlockGuard::new(Arc::clone(&self.chan), prefix))
    }

    /// Lines consumed (verify) or written (record) so far.
    pub fn current_line(&self) -> Result<u64, DilogError> {
        self.chan.lock().unwrap().current_line(self.enforce)
    }

    pub fn mode(&self) -> Mode {
        self.chan.lock().unwrap().mode()
    }

    /// Kind tag of the pending error, if the channel is poisoned.
    pub fn pending_kind(&self) -> Option<&'static str> {
        self.chan.lock().unwrap().pending_kind()
    }
}
