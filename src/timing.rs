// Time sources for wall-clock scheduling
// All scheduling math uses seconds (f64) since the source's epoch

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Absolute time in seconds since the time source epoch
pub type Seconds = f64;

/// Provides the current time to the clock and scheduler
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Seconds;
}

/// Monotonic system clock; epoch is the moment of creation
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    epoch: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Seconds {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Manually driven clock for tests and offline rendering
///
/// Clones share the same underlying time, so a test can keep one handle
/// and hand another to the engine.
#[derive(Debug, Clone)]
pub struct ManualTimeSource {
    bits: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new(start: Seconds) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, seconds: Seconds) {
        self.bits.store(seconds.to_bits(), Ordering::Relaxed);
    }

    /// Move time forward, returns the new time
    pub fn advance(&self, delta: Seconds) -> Seconds {
        let next = self.now() + delta.max(0.0);
        self.set(next);
        next
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Seconds {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_time_shared_between_clones() {
        let time = ManualTimeSource::new(1.5);
        let handle = time.clone();

        assert_eq!(handle.now(), 1.5);
        time.advance(0.25);
        assert_eq!(handle.now(), 1.75);

        handle.set(10.0);
        assert_eq!(time.now(), 10.0);
    }

    #[test]
    fn test_manual_time_never_goes_backwards_on_advance() {
        let time = ManualTimeSource::new(2.0);
        time.advance(-1.0);
        assert_eq!(time.now(), 2.0);
    }

    #[test]
    fn test_system_time_is_monotonic() {
        let time = SystemTimeSource::new();
        let a = time.now();
        let b = time.now();
        assert!(b >= a);
        assert!(a >= 0.0);
    }
}
