//! Time utilities for the client core
//!
//! Provides the monotonic nanosecond clock the RTT and clock-offset
//! estimators feed on, plus polling timers for the ping schedule and the
//! connect deadline.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic nanoseconds since the process-wide epoch.
///
/// The epoch is captured on first use, so values are only comparable
/// within one process. That is all the estimators need.
#[inline]
pub fn now_ns() -> u64 {
    let epoch = *EPOCH.get_or_init(Instant::now);
    Instant::now().duration_since(epoch).as_nanos() as u64
}

/// Default interval between system pings.
pub const PING_INTERVAL: Duration = Duration::from_millis(100);

/// Periodic polling timer.
///
/// Used for the ping schedule; the session polls `try_fire` from its pump
/// loop rather than owning a background task.
#[derive(Debug, Clone)]
pub struct Timer {
    interval: Duration,
    last_fire: Instant,
}

impl Timer {
    /// Create a timer that first fires one `interval` from now.
    pub fn new(interval: Duration) -> Self {
        Timer {
            interval,
            last_fire: Instant::now(),
        }
    }

    /// Check whether the interval has elapsed.
    pub fn expired(&self) -> bool {
        self.last_fire.elapsed() >= self.interval
    }

    /// Fire the timer if expired, returning whether it fired.
    pub fn try_fire(&mut self) -> bool {
        if self.expired() {
            self.last_fire = Instant::now();
            true
        } else {
            false
        }
    }

    /// Restart the interval from now.
    pub fn reset(&mut self) {
        self.last_fire = Instant::now();
    }
}

/// One-shot deadline.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Deadline {
            at: Instant::now() + timeout,
        }
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }
}
