//! Hardware-independent core library for the aeris air-quality station.
//!
//! This crate contains all platform-agnostic logic for the station: the
//! serial sensor drivers, frame recovery, the buffered logger, the event
//! queue the display consumes, and the compile-time calibration model.
//!
//! It is `#![no_std]` so it compiles on both the embedded target (ESP32-S3)
//! and desktop hosts (for the simulator and tests).

#![no_std]

#[cfg(test)]
extern crate std;

pub mod calibration;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod framing;
pub mod logger;
pub mod queue;
pub mod sensors;

#[cfg(test)]
pub(crate) mod testutil;
