//! Level-triggered scan channels.
//!
//! Each sequence exposes four channels an external monitoring layer polls:
//! general state change, run (EOS), start (SOS) and error. A channel is a
//! generation counter; a consumer remembers the last generation it saw and
//! rescans when the counter moves. Requests are lock-free so they are safe
//! from interrupt context.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which channel a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanKind {
    /// Any committed/loaded/enabled/synced state change.
    Changed,
    /// End-Of-Sequence observed (real or synthesized).
    Run,
    /// Start-Of-Sequence observed.
    Start,
    /// An error was recorded.
    Error,
}

/// One generation counter.
#[derive(Debug, Default)]
pub struct ScanChannel {
    generation: AtomicU64,
}

impl ScanChannel {
    /// Request a rescan.
    #[inline]
    pub fn request(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Current generation.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// True if a request happened after `seen`.
    #[inline]
    pub fn changed_since(&self, seen: u64) -> bool {
        self.generation() != seen
    }
}

/// The four channels of one sequence plus the last error message.
#[derive(Debug, Default)]
pub struct ScanChannels {
    changed: ScanChannel,
    run: ScanChannel,
    start: ScanChannel,
    error: ScanChannel,
    last_error: Mutex<Option<String>>,
}

impl ScanChannels {
    /// Create idle channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel for `kind`.
    pub fn channel(&self, kind: ScanKind) -> &ScanChannel {
        match kind {
            ScanKind::Changed => &self.changed,
            ScanKind::Run => &self.run,
            ScanKind::Start => &self.start,
            ScanKind::Error => &self.error,
        }
    }

    /// Request a rescan of `kind`.
    #[inline]
    pub fn request(&self, kind: ScanKind) {
        self.channel(kind).request();
    }

    /// Record an error message and request the error channel.
    pub fn raise_error(&self, message: impl Into<String>) {
        *self.last_error.lock() = Some(message.into());
        self.error.request();
    }

    /// Most recent error message, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}
