//! Wall-clock source for pacing
//!
//! Pacing only ever looks at differences between two readings, so the
//! origin of a clock is arbitrary.

use tokio::time::Instant;

/// Monotonic millisecond clock
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Clock backed by `tokio::time::Instant`
///
/// Follows tokio's paused/advanced time in tests that use it.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> i64 {
        self.origin.elapsed().as_millis() as i64
    }
}
