//! Monotonic time source abstraction.
//!
//! Drivers that schedule work (log timestamps, the particulate sensor's wake
//! timer) only ever need "milliseconds since boot". Taking that through a
//! trait keeps the drivers testable on the host, where tests substitute a
//! manually advanced clock.

/// Milliseconds elapsed since an arbitrary fixed origin, usually boot.
pub trait MonotonicClock {
    /// Current time in milliseconds. Must never go backwards.
    fn now_millis(&self) -> u64;
}

impl<C: MonotonicClock> MonotonicClock for &C {
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}

/// [`MonotonicClock`] backed by the embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl MonotonicClock for EmbassyClock {
    fn now_millis(&self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }
}
