// src/watchdog.rs
//
// Process-wide supervisor for background failures. Background tasks set
// the flag; the next foreground decision reads-and-clears it and fails
// with UnhandledBackgroundError so the host application notices.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Watchdog {
    background_error: AtomicBool,
    dropped_events: AtomicU64,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an unhandled background failure.
    pub fn report_background_error(&self) {
        self.background_error.store(true, Ordering::SeqCst);
    }

    /// Read-and-clear: returns whether a background error was pending.
    ///
    /// Single flag semantics: several failures between two foreground
    /// calls collapse into one surfaced error.
    pub fn has_background_error_been_reported(&self) -> bool {
        self.background_error.swap(false, Ordering::SeqCst)
    }

    /// Count an event shed by a full queue or a missed shutdown deadline.
    pub fn record_dropped_event(&self) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_event_count(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_is_cleared_by_read() {
        let w = Watchdog::new();
        assert!(!w.has_background_error_been_reported());
        w.report_background_error();
        w.report_background_error();
        assert!(w.has_background_error_been_reported());
        assert!(!w.has_background_error_been_reported());
    }

    #[test]
    fn dropped_events_accumulate() {
        let w = Watchdog::new();
        w.record_dropped_event();
        w.record_dropped_event();
        assert_eq!(w.dropped_event_count(), 2);
    }
}
