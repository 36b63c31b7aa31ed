//! ESP32-S3 firmware-specific modules for the aeris station
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: peripheral initialization, the USB serial console, the LCD status
//! screen and the status LED. Everything hardware-independent lives in
//! `aeris_core`.

#![no_std]

use aeris_core::event::EventQueue;

pub mod console;
pub mod display;
pub mod status_led;

/// Readings and button presses flow from the sensor tasks to the display
/// loop through this queue.
pub static EVENTS: EventQueue = EventQueue::new();
