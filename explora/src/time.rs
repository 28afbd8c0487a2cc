// src/time.rs
//
// Wall-clock seam so event timestamps are testable.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub type TimestampMs = i64;

pub trait TimeProvider: Send + Sync {
    fn now_ms(&self) -> TimestampMs;
}

/// System wall clock in epoch milliseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_ms(&self) -> TimestampMs {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as TimestampMs
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct FrozenTimeProvider {
    now_ms: AtomicI64,
}

impl FrozenTimeProvider {
    pub fn new(now_ms: TimestampMs) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl TimeProvider for FrozenTimeProvider {
    fn now_ms(&self) -> TimestampMs {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_clock_advances_only_on_request() {
        let clock = FrozenTimeProvider::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(250);
        assert_eq!(clock.now_ms(), 1_250);
    }
}
