//! Divergence-detection logging for programs that should behave
//! identically on every run over the same input, but do not.
//!
//! Instrument suspected divergence points with [`message`] calls and
//! wrap reorderable loop bodies in [`block`] scopes. The first run in a
//! directory *records* a canonical trace into `<channel>.dilog`; later
//! runs *verify* themselves against it and fail at the first real
//! divergence, tolerating loop iterations that legitimately execute in a
//! different order (threads, hash-map traversal, scheduler variation).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  instrumented application                    │
//! │    message("trk", ...)   block("trk", "hit") │
//! └──────────────┬───────────────────────────────┘
//!                │
//! ┌──────────────▼───────────────────────────────┐
//! │  registry: name → channel (record | verify)  │
//! └──────────────┬───────────────────────────────┘
//!                │ record: append framed lines
//!                │ verify: match lines, on mismatch:
//! ┌──────────────▼───────────────────────────────┐
//! │  reorder search                              │
//! │    walk later iterations of enclosing blocks │
//! │    replay the journal into each candidate    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! // Iteration order may differ between runs; content may not.
//! for item in work_items() {
//!     let _scope = dilog::block("tracker", "item").unwrap();
//!     dilog::message("tracker", &format!("id={}\n", item)).unwrap();
//! }
//! # fn work_items() -> Vec<u32> { vec![] }
//! ```
//!
//! Verification failures print a divergence diagnostic to stderr naming
//! the expected and found lines, the trace file position, and the
//! iterations still unmatched — then poison the channel so every later
//! operation on it keeps failing.

pub mod block;
pub mod channel;
pub mod error;
pub mod inspect;
pub mod journal;
pub mod record;
pub mod registry;
mod search;

pub use channel::{BlockGuard, Mode};
pub use error::DilogError;
pub use registry::{ChannelHandle, Dilog, ThreadGuard};

use std::sync::OnceLock;

/// The process-wide registry, rooted at the current directory. Created
/// on first use; [`shutdown`] drains its channels but the registry value
/// itself lives until process exit.
pub fn global() -> &'static Dilog {
    static GLOBAL: OnceLock<Dilog> = OnceLock::new();
    GLOBAL.get_or_init(Dilog::new)
}

/// Fetch (creating on first touch) the named channel of the global
/// registry, enforcing thread ownership.
pub fn get(channel: &str) -> Result<ChannelHandle, DilogError> {
    global().get(channel, ThreadGuard::Enforced)
}

/// Like [`get`] with an explicit thread-ownership policy.
pub fn get_with(channel: &str, guard: ThreadGuard) -> Result<ChannelHandle, DilogError> {
    global().get(channel, guard)
}

/// Record or verify one message on the named channel of the global
/// registry. `text` is treated as opaque already-formatted bytes; format
/// it up front. Returns the emitted byte count after normalization.
pub fn message(channel: &str, text: &str) -> Result<usize, DilogError> {
    global().message(channel, text)
}

/// Open one iteration of `name` on the named channel of the global
/// registry; the returned guard closes the iteration when dropped.
pub fn block(channel: &str, name: &str) -> Result<BlockGuard, DilogError> {
    global().block(channel, name)
}

/// Lines consumed (verify) or written (record) so far on the named
/// channel of the global registry.
pub fn current_line(channel: &str) -> Result<u64, DilogError> {
    global().current_line(channel)
}

/// Destroy all channels of the global registry: recorders flush,
/// verifiers check their trace was fully consumed.
pub fn shutdown() -> Vec<DilogError> {
    global().shutdown()
}
