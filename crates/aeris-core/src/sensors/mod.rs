//! Serial sensor drivers.
//!
//! Both drivers are generic over an [`embedded_io`] byte stream and an
//! [`embedded_hal`] delay, so the same code runs against a hardware UART on
//! the station and against scripted streams in tests and the simulator.

pub mod mhz19b;
pub mod pms5003t;

pub use mhz19b::{Co2Reading, Mhz19b};
pub use pms5003t::{PmReading, Pms5003t};
