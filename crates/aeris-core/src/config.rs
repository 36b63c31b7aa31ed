//! Station configuration.

use serde::{Deserialize, Serialize};

/// Tunable settings for one station.
///
/// Everything here has a sensible default, so a missing or partial
/// configuration still yields a working station.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct StationConfig {
    /// Seconds between CO2 measurement requests. The MH-Z19B doesn't do more
    /// than one measurement every 6 seconds, so asking more often just
    /// repeats values.
    pub co2_poll_secs: u64,
    /// Whether the CO2 sensor's automatic baseline correction is enabled.
    pub co2_abc_enabled: bool,
    /// Corrected CO2 ppm up to which the air rates as excellent.
    pub co2_excellent_ppm: i32,
    /// Corrected CO2 ppm up to which the air rates as good.
    pub co2_good_ppm: i32,
    /// Corrected CO2 ppm up to which the air rates as poor, beyond is bad.
    pub co2_poor_ppm: i32,
    /// Atmospheric PM2.5 (ug/m3) up to which the air rates as excellent.
    pub pm2_5_excellent: u16,
    /// Atmospheric PM2.5 (ug/m3) up to which the air rates as good.
    pub pm2_5_good: u16,
    /// Atmospheric PM2.5 (ug/m3) up to which the air rates as poor.
    pub pm2_5_poor: u16,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            co2_poll_secs: 6,
            co2_abc_enabled: true,
            co2_excellent_ppm: 800,
            co2_good_ppm: 1000,
            co2_poor_ppm: 1400,
            pm2_5_excellent: 12,
            pm2_5_good: 35,
            pm2_5_poor: 55,
        }
    }
}
