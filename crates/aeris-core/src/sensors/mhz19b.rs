//! Driver for the MH-Z19B NDIR CO2 sensor.
//!
//! The sensor speaks a fixed 9-byte frame protocol at 9600 baud. Every frame
//! starts with `0xFF` and ends with a checksum; responses echo the command
//! byte they answer. Raw readings are passed through
//! [`CO2_CORRECTION`](crate::calibration::CO2_CORRECTION) because the sensor
//! reads consistently low against a reference instrument.

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};
use log::{debug, error, info, warn};

use crate::calibration::CO2_CORRECTION;
use crate::error::ReadError;
use crate::framing::{self, HexBytes};

/// Length of every frame, in both directions.
pub const FRAME_LEN: usize = 9;

/// First byte of every frame.
pub const START_BYTE: u8 = 0xFF;

/// Sensor address, the second byte of every command frame.
const SENSOR_ADDR: u8 = 0x01;

/// The temperature register reads this many degrees above ambient.
const TEMPERATURE_OFFSET: i16 = 34;

const CMD_READ: u8 = 0x86;
const CMD_SET_ABC: u8 = 0x79;
const CMD_CALIBRATE_ZERO: u8 = 0x87;
const CMD_CALIBRATE_SPAN: u8 = 0x88;

/// One decoded CO2 measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Co2Reading {
    /// CO2 concentration exactly as the sensor reported it, in ppm.
    pub ppm_raw: u16,
    /// [`ppm_raw`](Self::ppm_raw) passed through the reference correction.
    pub ppm_corrected: i32,
    /// Sensor temperature in degrees Celsius.
    pub temperature: i16,
    /// Undocumented value the sensor reports in bytes 6 and 7.
    pub unknown: u16,
}

/// Frame checksum: negated sum of bytes 1 through 7, plus one.
pub fn checksum(frame: &[u8; FRAME_LEN]) -> u8 {
    let mut sum = 0u8;
    for &byte in &frame[1..8] {
        sum = sum.wrapping_add(byte);
    }
    0xFFu8.wrapping_sub(sum).wrapping_add(1)
}

/// Driver for one MH-Z19B attached to a serial stream.
///
/// `'h` is the lifetime of the handler registered with
/// [`set_handler`](Self::set_handler), which is invoked for measurements that
/// arrive through [`poll`](Self::poll).
pub struct Mhz19b<'h, S, D> {
    stream: S,
    delay: D,
    handler: Option<&'h mut dyn FnMut(&Co2Reading)>,
}

impl<'h, S, D> Mhz19b<'h, S, D>
where
    S: Read + ReadReady + Write,
    D: DelayNs,
{
    pub fn new(stream: S, delay: D) -> Self {
        Self {
            stream,
            delay,
            handler: None,
        }
    }

    /// Registers a callback for measurements decoded by [`poll`](Self::poll).
    pub fn set_handler(&mut self, handler: &'h mut dyn FnMut(&Co2Reading)) {
        self.handler = Some(handler);
    }

    /// Requests a measurement and decodes the response.
    pub fn read(&mut self) -> Result<Co2Reading, ReadError> {
        let result = self.command(CMD_READ, [0; 5]).and_then(decode_reading);
        // A trailing partial frame must not poison the next exchange.
        framing::drain(&mut self.stream)?;
        result
    }

    /// Consumes at most one buffered response frame, without blocking when
    /// none has arrived.
    ///
    /// Measurement responses are decoded and fed to the handler; command
    /// acknowledgements are logged and dropped.
    pub fn poll(&mut self) -> Result<Option<Co2Reading>, ReadError> {
        if !self.stream.read_ready().map_err(ReadError::io)? {
            return Ok(None);
        }
        let mut frame = [0u8; FRAME_LEN];
        framing::read_frame(&mut self.stream, &mut self.delay, START_BYTE, &mut frame)?;

        match frame[1] {
            CMD_READ => {
                let reading = decode_reading(frame)?;
                if let Some(handler) = &mut self.handler {
                    handler(&reading);
                }
                Ok(Some(reading))
            }
            cmd @ (CMD_SET_ABC | CMD_CALIBRATE_ZERO | CMD_CALIBRATE_SPAN) => {
                debug!("CO2 command {cmd:#04x} acknowledged");
                Ok(None)
            }
            cmd => {
                warn!("unrecognized CO2 response:{}", HexBytes(&frame));
                Err(ReadError::UnknownCommandEcho { cmd })
            }
        }
    }

    /// Enables or disables automatic baseline correction.
    ///
    /// With ABC on, the sensor assumes the lowest reading of each 24 hour
    /// cycle was 400 ppm and recalibrates itself around it. That only holds
    /// for rooms that are regularly aired out.
    pub fn set_abc(&mut self, enabled: bool) -> Result<(), ReadError> {
        info!("setting CO2 automatic baseline correction to {enabled}");
        let arg = if enabled { 0xA0 } else { 0x00 };
        self.command(CMD_SET_ABC, [arg, 0, 0, 0, 0]).map(|_| ())
    }

    /// Calibrates the zero point. Only run this after the sensor has been in
    /// fresh air (around 400 ppm) for at least 20 minutes.
    pub fn calibrate_zero_point(&mut self) -> Result<(), ReadError> {
        info!("calibrating CO2 zero point");
        self.command(CMD_CALIBRATE_ZERO, [0; 5]).map(|_| ())
    }

    /// Calibrates the span point against a known concentration of `ppm`.
    /// Calibrate the zero point first; 2000 ppm is the recommended span gas.
    pub fn calibrate_span_point(&mut self, ppm: u16) -> Result<(), ReadError> {
        info!("calibrating CO2 span point at {ppm} ppm");
        let [hi, lo] = ppm.to_be_bytes();
        self.command(CMD_CALIBRATE_SPAN, [0, hi, lo, 0, 0])
            .map(|_| ())
    }

    /// Sends one command frame and waits for the response frame. The sensor
    /// answers every command, including calibration ones.
    fn command(&mut self, cmd: u8, args: [u8; 5]) -> Result<[u8; FRAME_LEN], ReadError> {
        let mut frame = [
            START_BYTE, SENSOR_ADDR, cmd, args[0], args[1], args[2], args[3], args[4], 0,
        ];
        frame[8] = checksum(&frame);
        debug!("  >>{}", HexBytes(&frame));

        let result = self.exchange(&frame);
        if let Err(err) = &result {
            error!("CO2 command {cmd:#04x} failed: {err}");
        }
        result
    }

    fn exchange(&mut self, request: &[u8; FRAME_LEN]) -> Result<[u8; FRAME_LEN], ReadError> {
        self.stream.write_all(request).map_err(ReadError::io)?;
        self.stream.flush().map_err(ReadError::io)?;

        let mut response = [0u8; FRAME_LEN];
        framing::read_frame(&mut self.stream, &mut self.delay, START_BYTE, &mut response)?;
        Ok(response)
    }
}

/// Decodes a measurement response that has already been framed.
fn decode_reading(frame: [u8; FRAME_LEN]) -> Result<Co2Reading, ReadError> {
    let computed = checksum(&frame);
    if frame[8] != computed {
        error!(
            "CO2 checksum failed: received {:#04x}, should be {computed:#04x}",
            frame[8]
        );
        return Err(ReadError::ChecksumMismatch {
            got: u16::from(frame[8]),
            computed: u16::from(computed),
        });
    }

    let ppm_raw = u16::from_be_bytes([frame[2], frame[3]]);
    let temperature = i16::from(frame[4]) - TEMPERATURE_OFFSET;
    let status = frame[5];
    let unknown = u16::from_be_bytes([frame[6], frame[7]]);

    // Always zero on the 19b revision.
    if status != 0 {
        warn!("CO2 sensor status not OK: {status:#04x}");
    }

    debug!("applying linear correction: {CO2_CORRECTION}");
    let ppm_corrected = CO2_CORRECTION.apply(&[f64::from(temperature), f64::from(ppm_raw)]) as i32;

    Ok(Co2Reading {
        ppm_raw,
        ppm_corrected,
        temperature,
        unknown,
    })
}
