#![deny(unsafe_code)]
//! Monotonic millisecond clock
//!
//! Board timers are free-running 32-bit millisecond counters that wrap roughly
//! every 49.7 days. All timer arithmetic in the supervisor goes through
//! [`ClockReading::elapsed_since`] so that the wrap is handled in one place.

/// A single reading of the monotonic millisecond counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockReading(u32);

impl ClockReading {
    /// Counter value at boot
    pub const ZERO: Self = Self(0);

    /// Wrap a raw millisecond counter value
    pub const fn from_millis(millis: u32) -> Self {
        Self(millis)
    }

    /// Raw millisecond counter value
    pub const fn as_millis(self) -> u32 {
        self.0
    }

    /// Milliseconds elapsed from `earlier` to `self`
    ///
    /// The counter is treated as modular, so a reading taken just after the
    /// counter wrapped still yields the true distance:
    ///
    /// ```
    /// use connectivity_hal::ClockReading;
    ///
    /// let before = ClockReading::from_millis(u32::MAX - 9);
    /// let after = ClockReading::from_millis(5);
    /// assert_eq!(after.elapsed_since(before), 15);
    /// ```
    pub const fn elapsed_since(self, earlier: ClockReading) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// Reading `millis` after this one, wrapping past `u32::MAX`
    pub const fn offset(self, millis: u32) -> Self {
        Self(self.0.wrapping_add(millis))
    }
}

/// Source of monotonic millisecond readings
///
/// Implemented by the board's timer (or by a test clock on the host).
pub trait Clock {
    /// Current counter value
    fn now(&self) -> ClockReading;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> ClockReading {
        (**self).now()
    }
}
