#![deny(unsafe_code)]
//! Interval gating and timeouts on top of the wrapping millisecond clock

use connectivity_hal::ClockReading;

/// Gate that lets a periodic task run at most once per interval
///
/// The first call to [`is_due`](Self::is_due) always succeeds, so a freshly
/// created task runs on the very first tick.
#[derive(Debug, Clone, Copy)]
pub struct IntervalTimer {
    interval_ms: u32,
    last_run: Option<ClockReading>,
}

impl IntervalTimer {
    /// Create a gate for a task that should run every `interval_ms`
    pub const fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last_run: None,
        }
    }

    /// Whether the task should run at `now`; records `now` as the last run
    /// when it returns `true`
    pub fn is_due(&mut self, now: ClockReading) -> bool {
        match self.last_run {
            Some(last) if now.elapsed_since(last) < self.interval_ms => false,
            _ => {
                self.last_run = Some(now);
                true
            }
        }
    }

    /// Make the next call due regardless of elapsed time
    pub fn reset(&mut self) {
        self.last_run = None;
    }

    pub const fn interval_ms(&self) -> u32 {
        self.interval_ms
    }
}

/// A timeout armed at a given reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Deadline {
    armed_at: ClockReading,
    duration_ms: u32,
}

impl Deadline {
    /// Arm a deadline `duration_ms` after `now`
    pub const fn arm(now: ClockReading, duration_ms: u32) -> Self {
        Self {
            armed_at: now,
            duration_ms,
        }
    }

    /// True once at least `duration_ms` have passed since arming
    pub const fn has_expired(&self, now: ClockReading) -> bool {
        now.elapsed_since(self.armed_at) >= self.duration_ms
    }

    /// Milliseconds left before expiry (zero once expired)
    pub const fn remaining(&self, now: ClockReading) -> u32 {
        self.duration_ms
            .saturating_sub(now.elapsed_since(self.armed_at))
    }

    pub const fn armed_at(&self) -> ClockReading {
        self.armed_at
    }
}
