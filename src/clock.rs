//! Clock implementations

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::core::{Clock, Timestamp};

/// Wall clock. Never reports a time earlier than one it already returned.
#[derive(Default)]
pub struct SystemClock {
    last: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = Utc::now().timestamp();
        let prev = self.last.fetch_max(wall, Ordering::AcqRel);
        prev.max(wall)
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Move to `t`. Earlier times are ignored.
    pub fn set(&self, t: Timestamp) {
        self.now.fetch_max(t, Ordering::AcqRel);
    }

    pub fn advance(&self, secs: i64) {
        if secs > 0 {
            self.now.fetch_add(secs, Ordering::AcqRel);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::Acquire)
    }
}
