//! Desktop simulator for the aeris air-quality station.
//!
//! Runs the aeris-core sensor drivers against scripted UART streams so the
//! whole pipeline (framing, decoding, calibration, events, the buffered
//! logger) can be exercised without hardware. The scenario walks through the
//! interesting cases one by one:
//!
//! - a clean CO2 exchange
//! - a CO2 response preceded by line garbage
//! - a corrupt CO2 response
//! - a CO2 request that gets no answer at all
//! - the particulate sensor's wake/ack/reading/sleep cycle, including a
//!   corrupt frame and a zero reading
//!
//! Log output goes through the same [`AsyncLogger`] the station uses, drained
//! to stdout by a background thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use aeris_core::clock::EmbassyClock;
use aeris_core::config::StationConfig;
use aeris_core::event::{AirQuality, EventQueue, StationEvent, publish};
use aeris_core::logger::{AsyncLogger, LogSink, WRITE_DELAY_MS};
use aeris_core::sensors::mhz19b::{self, Mhz19b};
use aeris_core::sensors::pms5003t::{self, PmReading, Pms5003t};
use embedded_hal::delay::DelayNs;
use log::{LevelFilter, info};

static LOGGER: AsyncLogger<EmbassyClock> = AsyncLogger::new(EmbassyClock);
static EVENTS: EventQueue = EventQueue::new();

// ---------------------------------------------------------------------------
// Host-side stand-ins for the station peripherals
// ---------------------------------------------------------------------------

/// Log sink that prints to stdout.
struct StdoutSink;

impl LogSink for StdoutSink {
    fn write_line(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Delay backed by the operating system.
struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns.into()));
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us.into()));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms.into()));
    }
}

/// A UART whose receive side is scripted by the simulator.
///
/// The handle is cheaply cloneable so the scenario can keep feeding bytes
/// while a driver owns its own copy of the stream.
#[derive(Clone, Default)]
struct ScriptedUart {
    inner: Rc<RefCell<UartState>>,
}

#[derive(Default)]
struct UartState {
    input: VecDeque<u8>,
    written: Vec<u8>,
}

impl ScriptedUart {
    fn new() -> Self {
        Self::default()
    }

    /// Makes `bytes` available to the next reads, as if they had just
    /// arrived on the wire.
    fn feed(&self, bytes: &[u8]) {
        self.inner.borrow_mut().input.extend(bytes);
    }

    /// Number of command bytes the driver has sent so far.
    fn written_len(&self) -> usize {
        self.inner.borrow().written.len()
    }
}

impl embedded_io::ErrorType for ScriptedUart {
    type Error = core::convert::Infallible;
}

impl embedded_io::Read for ScriptedUart {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut state = self.inner.borrow_mut();
        let mut taken = 0;
        while taken < buf.len() {
            match state.input.pop_front() {
                Some(byte) => {
                    buf[taken] = byte;
                    taken += 1;
                }
                None => break,
            }
        }
        Ok(taken)
    }
}

impl embedded_io::ReadReady for ScriptedUart {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.inner.borrow().input.is_empty())
    }
}

impl embedded_io::Write for ScriptedUart {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.inner.borrow_mut().written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted frames
// ---------------------------------------------------------------------------

/// A CO2 measurement response for the given raw ppm and temperature
/// register value.
fn co2_response(ppm: u16, temperature_register: u8) -> [u8; mhz19b::FRAME_LEN] {
    let mut frame = [0u8; mhz19b::FRAME_LEN];
    frame[0] = mhz19b::START_BYTE;
    // Responses echo the command byte they answer; 0x86 is a measurement.
    frame[1] = 0x86;
    frame[2..4].copy_from_slice(&ppm.to_be_bytes());
    frame[4] = temperature_register;
    frame[8] = mhz19b::checksum(&frame);
    frame
}

/// A full 32-byte particulate measurement frame around the 13 data values.
fn pm_frame(values: [u16; 13]) -> [u8; 32] {
    let mut frame = [0u8; 32];
    frame[0] = pms5003t::START_BYTE_1;
    frame[1] = pms5003t::START_BYTE_2;
    frame[2..4].copy_from_slice(&(pms5003t::READING_LEN as u16).to_be_bytes());
    for (i, value) in values.iter().enumerate() {
        frame[4 + 2 * i..6 + 2 * i].copy_from_slice(&value.to_be_bytes());
    }
    let checksum: u16 = frame[..30].iter().map(|&byte| u16::from(byte)).sum();
    frame[30..32].copy_from_slice(&checksum.to_be_bytes());
    frame
}

/// The acknowledgement the particulate sensor sends for sleep commands.
const PM_ACK: [u8; 8] = [0x42, 0x4D, 0x00, 0x04, 0xE4, 0x01, 0x01, 0x78];

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

fn run_co2_scenario() {
    info!("--- CO2 sensor ---");
    let uart = ScriptedUart::new();
    let mut sensor = Mhz19b::new(uart.clone(), StdDelay);

    // A clean exchange.
    uart.feed(&co2_response(600, 0x23));
    match sensor.read() {
        Ok(reading) => info!(
            "CO2: {} ppm raw, {} ppm corrected, {} degrees",
            reading.ppm_raw, reading.ppm_corrected, reading.temperature
        ),
        Err(err) => info!("CO2 read failed: {err}"),
    }

    // Garbage on the line before the response; the driver resynchronizes.
    uart.feed(&[0xDE, 0xAD]);
    uart.feed(&co2_response(831, 0x30));
    if let Ok(reading) = sensor.read() {
        publish(&EVENTS, StationEvent::Co2(reading));
    }

    // A response whose checksum does not add up.
    let mut corrupt = co2_response(600, 0x23);
    corrupt[8] ^= 0xFF;
    uart.feed(&corrupt);
    if let Err(err) = sensor.read() {
        info!("corrupt response rejected: {err}");
    }

    // No response at all; this takes the full one second polling budget.
    if let Err(err) = sensor.read() {
        info!("silent sensor: {err}");
    }
}

fn run_pm_scenario() {
    info!("--- particulate sensor ---");
    let uart = ScriptedUart::new();
    let mut deliver = |reading: &PmReading| publish(&EVENTS, StationEvent::Pm(*reading));
    let mut sensor = Pms5003t::new(uart.clone(), StdDelay, EmbassyClock);
    sensor.set_handler(&mut deliver);

    // The first poll wakes the sensor; it acknowledges.
    uart.feed(&PM_ACK);
    let _ = sensor.poll();

    // Noise between frames is skipped.
    uart.feed(&[0x00, 0x13]);
    let _ = sensor.poll();

    // A frame with a flipped bit fails the checksum.
    let mut corrupt = pm_frame([12, 34, 56, 13, 35, 57, 100, 90, 80, 70, 213, 455, 0]);
    corrupt[9] ^= 0x40;
    uart.feed(&corrupt);
    if let Err(err) = sensor.poll() {
        info!("corrupt frame rejected: {err}");
    }

    // The fan is still spinning up, the sensor reports zeroes.
    uart.feed(&pm_frame([0; 13]));
    let _ = sensor.poll();

    // A real reading; the driver sleeps the sensor again afterwards.
    uart.feed(&pm_frame([12, 34, 56, 13, 35, 57, 100, 90, 80, 70, 213, 455, 0]));
    match sensor.poll() {
        Ok(Some(reading)) => info!(
            "PM2.5: {} ug/m3 at {:.1}C, {:.1}% humidity",
            reading.pm2_5_atm,
            reading.temperature(),
            reading.humidity()
        ),
        Ok(None) => info!("no particulate reading"),
        Err(err) => info!("particulate poll failed: {err}"),
    }

    // The sensor acknowledges the sleep command.
    uart.feed(&PM_ACK);
    let _ = sensor.poll();

    drop(sensor);
    info!("particulate driver sent {} command bytes", uart.written_len());
}

fn main() {
    log::set_logger(&LOGGER).expect("no other logger is installed");
    log::set_max_level(LevelFilter::Debug);

    // Drain the log queue the way the station's console task does.
    std::thread::spawn(|| {
        loop {
            std::thread::sleep(Duration::from_millis(WRITE_DELAY_MS));
            LOGGER.flush_to(&mut StdoutSink);
        }
    });

    info!("starting aeris simulator");

    run_co2_scenario();
    run_pm_scenario();

    // Let the display side of the station have its turn: consume the events
    // the drivers published and rate them.
    let config = StationConfig::default();
    for event in EVENTS.consume() {
        match event {
            StationEvent::Co2(reading) => info!(
                "air quality from CO2 {}: {}",
                reading.ppm_corrected,
                AirQuality::from_co2(reading.ppm_corrected, &config).label()
            ),
            StationEvent::Pm(reading) => info!(
                "air quality from PM2.5 {}: {}",
                reading.pm2_5_atm,
                AirQuality::from_pm2_5(reading.pm2_5_atm, &config).label()
            ),
            StationEvent::ButtonPressed => {}
        }
    }

    info!("simulator exiting");
    // One synchronous flush so nothing is lost when the process ends.
    std::thread::sleep(Duration::from_millis(WRITE_DELAY_MS));
    LOGGER.flush_to(&mut StdoutSink);
}
