//! User idle tracking for the deferral gate.
//!
//! Deferred modules only resurface after the user has been continuously away
//! from the machine for a threshold. The engine never talks to the platform
//! input APIs directly: the presentation layer (which already receives input
//! activity) feeds a [`SharedIdleSource`], and the engine only asks "how long
//! since the last input".

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Continuous idle time required before a deferred module may resurface.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(600);

/// Source of "time since last user input".
pub trait IdleSource: Send + Sync {
    /// Duration since the last observed user input.
    fn idle_duration(&self) -> Duration;
}

/// Idle source fed by input notifications from the presentation layer.
///
/// Stores the last-input instant as milliseconds since construction; a single
/// atomic keeps `touch` cheap enough to call on every input event.
pub struct SharedIdleSource {
    epoch: Instant,
    last_input_ms: AtomicU64,
}

impl SharedIdleSource {
    /// Creates a source that considers "now" the last input.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            epoch: Instant::now(),
            last_input_ms: AtomicU64::new(0),
        })
    }

    /// Records user input at the current instant.
    pub fn touch(&self) {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        self.last_input_ms.store(now_ms, Ordering::Relaxed);
    }
}

impl IdleSource for SharedIdleSource {
    fn idle_duration(&self) -> Duration {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        let last_ms = self.last_input_ms.load(Ordering::Relaxed);
        Duration::from_millis(now_ms.saturating_sub(last_ms))
    }
}

/// Fixed idle source for tests.
pub struct FixedIdleSource(pub Duration);

impl IdleSource for FixedIdleSource {
    fn idle_duration(&self) -> Duration {
        self.0
    }
}

/// The deferral gate: wraps a source with a threshold.
pub struct IdleMonitor {
    source: Arc<dyn IdleSource>,
    threshold: Duration,
}

impl IdleMonitor {
    /// Creates a monitor with the default threshold.
    pub fn new(source: Arc<dyn IdleSource>) -> Self {
        Self {
            source,
            threshold: DEFAULT_IDLE_THRESHOLD,
        }
    }

    /// Overrides the idle threshold.
    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    /// Returns `true` when deferred modules may resurface.
    pub fn gate_open(&self) -> bool {
        self.source.idle_duration() >= self.threshold
    }

    /// Current idle duration, for logging.
    pub fn idle_duration(&self) -> Duration {
        self.source.idle_duration()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
