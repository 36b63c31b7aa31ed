//! Station events and air quality assessment.
//!
//! Sensor tasks publish readings as events; the display task consumes them
//! and keeps whatever state it needs. The queue decouples the two so a slow
//! display refresh never blocks a sensor exchange.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::warn;

use crate::config::StationConfig;
use crate::queue::ThreadSafeQueue;
use crate::sensors::{Co2Reading, PmReading};

/// Capacity of the station event queue, sized for a burst of readings
/// between two display refreshes.
pub const EVENT_QUEUE_LEN: usize = 16;

/// Everything the sensing side can tell the display side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StationEvent {
    /// A CO2 measurement arrived.
    Co2(Co2Reading),
    /// A particulate measurement arrived.
    Pm(PmReading),
    /// The user pressed the front button.
    ButtonPressed,
}

/// Queue shared between the sensing tasks and the display task.
pub type EventQueue = ThreadSafeQueue<CriticalSectionRawMutex, StationEvent, EVENT_QUEUE_LEN>;

/// Adds `event` to `queue`, logging when the queue was full and the event
/// had to be dropped.
pub fn publish(queue: &EventQueue, event: StationEvent) {
    if !queue.add(event) {
        warn!("event queue full, dropping {event:?}");
    }
}

/// Quality rating for the measured air.
///
/// Ordered from best to worst so that [`max`](Ord::max) of two ratings is
/// the worse one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AirQuality {
    /// Optimal conditions
    Excellent,
    /// Acceptable conditions
    Good,
    /// Sub-optimal conditions
    Poor,
    /// Problematic conditions
    Bad,
}

impl AirQuality {
    /// Rates a corrected CO2 concentration against the configured
    /// thresholds.
    pub fn from_co2(ppm: i32, config: &StationConfig) -> Self {
        if ppm <= config.co2_excellent_ppm {
            Self::Excellent
        } else if ppm <= config.co2_good_ppm {
            Self::Good
        } else if ppm <= config.co2_poor_ppm {
            Self::Poor
        } else {
            Self::Bad
        }
    }

    /// Rates an atmospheric PM2.5 concentration (ug/m3) against the
    /// configured thresholds.
    pub fn from_pm2_5(ug_m3: u16, config: &StationConfig) -> Self {
        if ug_m3 <= config.pm2_5_excellent {
            Self::Excellent
        } else if ug_m3 <= config.pm2_5_good {
            Self::Good
        } else if ug_m3 <= config.pm2_5_poor {
            Self::Poor
        } else {
            Self::Bad
        }
    }

    /// Combines two ratings; the worse one wins.
    pub fn combine(self, other: Self) -> Self {
        self.max(other)
    }

    /// Display label for this rating.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Poor => "Poor",
            Self::Bad => "Bad",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn co2_thresholds_are_inclusive() {
        let config = StationConfig::default();
        assert_eq!(AirQuality::from_co2(800, &config), AirQuality::Excellent);
        assert_eq!(AirQuality::from_co2(801, &config), AirQuality::Good);
        assert_eq!(AirQuality::from_co2(1000, &config), AirQuality::Good);
        assert_eq!(AirQuality::from_co2(1001, &config), AirQuality::Poor);
        assert_eq!(AirQuality::from_co2(1400, &config), AirQuality::Poor);
        assert_eq!(AirQuality::from_co2(1401, &config), AirQuality::Bad);
    }

    #[test]
    fn pm_thresholds_are_inclusive() {
        let config = StationConfig::default();
        assert_eq!(AirQuality::from_pm2_5(12, &config), AirQuality::Excellent);
        assert_eq!(AirQuality::from_pm2_5(13, &config), AirQuality::Good);
        assert_eq!(AirQuality::from_pm2_5(35, &config), AirQuality::Good);
        assert_eq!(AirQuality::from_pm2_5(36, &config), AirQuality::Poor);
        assert_eq!(AirQuality::from_pm2_5(55, &config), AirQuality::Poor);
        assert_eq!(AirQuality::from_pm2_5(56, &config), AirQuality::Bad);
    }

    #[test]
    fn combining_ratings_keeps_the_worse_one() {
        assert_eq!(
            AirQuality::Good.combine(AirQuality::Bad),
            AirQuality::Bad
        );
        assert_eq!(
            AirQuality::Excellent.combine(AirQuality::Excellent),
            AirQuality::Excellent
        );
        assert_eq!(
            AirQuality::Poor.combine(AirQuality::Good),
            AirQuality::Poor
        );
    }

    #[test]
    fn labels_match_the_ratings() {
        assert_eq!(AirQuality::Excellent.label(), "Excellent");
        assert_eq!(AirQuality::Bad.label(), "Bad");
    }

    #[test]
    fn publish_drops_events_when_the_queue_is_full() {
        let queue = EventQueue::new();
        for _ in 0..EVENT_QUEUE_LEN {
            publish(&queue, StationEvent::ButtonPressed);
        }
        publish(&queue, StationEvent::ButtonPressed);
        assert_eq!(queue.len(), EVENT_QUEUE_LEN);
    }
}
