//! Driver for the PMS5003T particulate matter sensor.
//!
//! The sensor free-runs while awake, pushing a 32-byte frame roughly once a
//! second: a `0x42 0x4D` header, a big-endian payload length, thirteen
//! big-endian values and an additive checksum. To stretch the laser's duty
//! cycle the driver puts the sensor to sleep after every accepted reading and
//! wakes it again ten seconds later from [`poll`](Pms5003t::poll).

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};
use log::{debug, error, info, warn};

use crate::clock::MonotonicClock;
use crate::error::ReadError;
use crate::framing::{self, HexBytes};

/// First header byte of every frame, in both directions.
pub const START_BYTE_1: u8 = 0x42;

/// Second header byte of every frame.
pub const START_BYTE_2: u8 = 0x4D;

/// Payload length of a measurement frame.
pub const READING_LEN: usize = 28;

/// Payload length of a command acknowledgement.
const ACK_LEN: usize = 4;

/// Command byte for entering and leaving sleep mode.
const CMD_SLEEP: u8 = 0xE4;

/// How long the sensor sleeps after a reading before being woken again.
pub const WAKE_DELAY_MS: u64 = 10_000;

/// One decoded particulate measurement. Concentrations are in ug/m3, particle
/// counts per 0.1 l of air.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmReading {
    /// PM1.0 concentration at standard conditions.
    pub pm1_0_std: u16,
    /// PM2.5 concentration at standard conditions.
    pub pm2_5_std: u16,
    /// PM10 concentration at standard conditions.
    pub pm10_std: u16,
    /// PM1.0 concentration at atmospheric conditions.
    pub pm1_0_atm: u16,
    /// PM2.5 concentration at atmospheric conditions.
    pub pm2_5_atm: u16,
    /// PM10 concentration at atmospheric conditions.
    pub pm10_atm: u16,
    /// Particles larger than 0.3 um.
    pub pm0_3_cnt: u16,
    /// Particles larger than 0.5 um.
    pub pm0_5_cnt: u16,
    /// Particles larger than 1.0 um.
    pub pm1_0_cnt: u16,
    /// Particles larger than 2.5 um.
    pub pm2_5_cnt: u16,
    /// Temperature in tenths of a degree Celsius.
    pub temp: u16,
    /// Relative humidity in tenths of a percent.
    pub hum: u16,
    /// Reserved by the protocol.
    pub reserved: u16,
    /// Checksum as carried in the frame.
    pub checksum: u16,
}

impl PmReading {
    /// Decodes the 28-byte payload of a measurement frame.
    pub fn parse(payload: &[u8; READING_LEN]) -> Self {
        let field = |i: usize| u16::from_be_bytes([payload[2 * i], payload[2 * i + 1]]);
        Self {
            pm1_0_std: field(0),
            pm2_5_std: field(1),
            pm10_std: field(2),
            pm1_0_atm: field(3),
            pm2_5_atm: field(4),
            pm10_atm: field(5),
            pm0_3_cnt: field(6),
            pm0_5_cnt: field(7),
            pm1_0_cnt: field(8),
            pm2_5_cnt: field(9),
            temp: field(10),
            hum: field(11),
            reserved: field(12),
            checksum: field(13),
        }
    }

    /// Temperature in degrees Celsius.
    pub fn temperature(&self) -> f32 {
        f32::from(self.temp) / 10.0
    }

    /// Relative humidity in percent.
    pub fn humidity(&self) -> f32 {
        f32::from(self.hum) / 10.0
    }
}

/// The additive checksum the protocol uses: a plain 16-bit sum of bytes.
fn additive_checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |sum, &byte| sum.wrapping_add(u16::from(byte)))
}

/// Driver for one PMS5003T attached to a serial stream.
///
/// `'h` is the lifetime of the handler registered with
/// [`set_handler`](Self::set_handler), which receives every accepted reading.
pub struct Pms5003t<'h, S, D, C> {
    stream: S,
    delay: D,
    clock: C,
    /// When to send the next wake command; `Some(0)` wakes on the first poll.
    wake_deadline: Option<u64>,
    handler: Option<&'h mut dyn FnMut(&PmReading)>,
}

impl<'h, S, D, C> Pms5003t<'h, S, D, C>
where
    S: Read + ReadReady + Write,
    D: DelayNs,
    C: MonotonicClock,
{
    /// Creates the driver. The sensor is woken on the first
    /// [`poll`](Self::poll) in case a previous run left it sleeping.
    pub fn new(stream: S, delay: D, clock: C) -> Self {
        Self {
            stream,
            delay,
            clock,
            wake_deadline: Some(0),
            handler: None,
        }
    }

    /// Registers a callback for accepted readings.
    pub fn set_handler(&mut self, handler: &'h mut dyn FnMut(&PmReading)) {
        self.handler = Some(handler);
    }

    /// Puts the sensor to sleep or wakes it.
    ///
    /// Sleeping arms the wake timer; [`poll`](Self::poll) sends the wake
    /// command once it expires.
    pub fn set_sleep(&mut self, enabled: bool) -> Result<(), ReadError> {
        info!("setting particulate sensor sleep mode to {enabled}");
        let mut cmd = [
            START_BYTE_1,
            START_BYTE_2,
            CMD_SLEEP,
            0x00,
            u8::from(!enabled),
            0x00,
            0x00,
        ];
        let checksum = additive_checksum(&cmd[..5]);
        cmd[5..7].copy_from_slice(&checksum.to_be_bytes());
        debug!("  >>{}", HexBytes(&cmd));

        self.stream.write_all(&cmd).map_err(ReadError::io)?;
        self.stream.flush().map_err(ReadError::io)?;
        self.wake_deadline = enabled.then(|| self.clock.now_millis() + WAKE_DELAY_MS);
        Ok(())
    }

    /// Drives the sensor: wakes it once its sleep period is over, then
    /// consumes at most one buffered frame.
    pub fn poll(&mut self) -> Result<Option<PmReading>, ReadError> {
        if self
            .wake_deadline
            .is_some_and(|deadline| self.clock.now_millis() >= deadline)
        {
            self.set_sleep(false)?;
        }
        self.process_input()
    }

    fn process_input(&mut self) -> Result<Option<PmReading>, ReadError> {
        if !self.stream.read_ready().map_err(ReadError::io)? {
            return Ok(None);
        }

        let mut header = [0u8; 4];
        framing::read_exact(&mut self.stream, &mut self.delay, &mut header[..1])?;
        if header[0] != START_BYTE_1 {
            let junk = framing::drain(&mut self.stream)?;
            warn!(
                "incorrect start byte 1 of particulate reading: {:02X}{junk}",
                header[0]
            );
            return Ok(None);
        }
        framing::read_exact(&mut self.stream, &mut self.delay, &mut header[1..])?;
        if header[1] != START_BYTE_2 {
            let junk = framing::drain(&mut self.stream)?;
            warn!(
                "incorrect start byte 2 of particulate reading: {:02X}{junk}",
                header[1]
            );
            return Ok(None);
        }

        let len = usize::from(u16::from_be_bytes([header[2], header[3]]));
        match len {
            // The response to a sleep command, nothing in it to check.
            ACK_LEN => {
                let mut ack = [0u8; ACK_LEN];
                framing::read_exact(&mut self.stream, &mut self.delay, &mut ack)?;
                debug!("  <<{}", HexBytes(&ack));
                Ok(None)
            }
            READING_LEN => self.read_reading(&header),
            _ => {
                let junk = framing::drain(&mut self.stream)?;
                warn!("unexpected payload length {len}, skipping:{junk}");
                Err(ReadError::UnexpectedLength { len })
            }
        }
    }

    fn read_reading(&mut self, header: &[u8; 4]) -> Result<Option<PmReading>, ReadError> {
        let mut payload = [0u8; READING_LEN];
        framing::read_exact(&mut self.stream, &mut self.delay, &mut payload)?;
        debug!("  <<{}", HexBytes(&payload));

        let reading = PmReading::parse(&payload);
        // The checksum covers the header bytes too, not just the payload.
        let computed = additive_checksum(header)
            .wrapping_add(additive_checksum(&payload[..READING_LEN - 2]));
        if reading.checksum != computed {
            error!(
                "particulate checksum didn't match: {} vs. {} (computed)",
                reading.checksum, computed
            );
            return Err(ReadError::ChecksumMismatch {
                got: reading.checksum,
                computed,
            });
        }

        info!(
            "\n  STD: PM1.0: {}, PM2.5: {}, PM10: {}\n  ATM: PM1.0: {}, PM2.5: {}, PM10: {}\n  CNT: PM0.3: {}, PM0.5: {}, PM1.0: {}, PM2.5: {}\n  Temp: {}C, Hum: {}%",
            reading.pm1_0_std,
            reading.pm2_5_std,
            reading.pm10_std,
            reading.pm1_0_atm,
            reading.pm2_5_atm,
            reading.pm10_atm,
            reading.pm0_3_cnt,
            reading.pm0_5_cnt,
            reading.pm1_0_cnt,
            reading.pm2_5_cnt,
            reading.temperature(),
            reading.humidity(),
        );

        // The sensor pushes a few all-zero frames while its fan spins up.
        if reading.pm2_5_atm == 0 {
            warn!("skipping zero reading from particulate sensor");
            return Ok(None);
        }

        // One good reading per cycle; sleep until the wake timer fires.
        self.set_sleep(true)?;
        if let Some(handler) = &mut self.handler {
            handler(&reading);
        }
        Ok(Some(reading))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FixedClock, MockStream, NoopDelay};

    const WAKE_CMD: [u8; 7] = [0x42, 0x4D, 0xE4, 0x00, 0x01, 0x01, 0x74];
    const SLEEP_CMD: [u8; 7] = [0x42, 0x4D, 0xE4, 0x00, 0x00, 0x01, 0x73];

    /// Builds a full 32-byte measurement frame around the 13 data values.
    fn reading_frame(values: [u16; 13]) -> [u8; 32] {
        let mut frame = [0u8; 32];
        frame[0] = START_BYTE_1;
        frame[1] = START_BYTE_2;
        frame[2..4].copy_from_slice(&(READING_LEN as u16).to_be_bytes());
        for (i, value) in values.iter().enumerate() {
            frame[4 + 2 * i..6 + 2 * i].copy_from_slice(&value.to_be_bytes());
        }
        let checksum = additive_checksum(&frame[..30]);
        frame[30..32].copy_from_slice(&checksum.to_be_bytes());
        frame
    }

    #[test]
    fn poll_wakes_decodes_and_goes_back_to_sleep() {
        let frame = reading_frame([12, 34, 56, 13, 35, 57, 100, 90, 80, 70, 213, 455, 0]);
        let mut stream = MockStream::new(&frame);
        let clock = FixedClock::at(5_000);

        let mut seen = None;
        let mut handler = |reading: &PmReading| seen = Some(*reading);
        {
            let mut sensor = Pms5003t::new(&mut stream, NoopDelay, &clock);
            sensor.set_handler(&mut handler);

            let reading = sensor.poll().unwrap().unwrap();
            assert_eq!(reading.pm1_0_std, 12);
            assert_eq!(reading.pm2_5_atm, 35);
            assert_eq!(reading.temperature(), 21.3);
            assert_eq!(reading.humidity(), 45.5);
        }
        assert_eq!(seen.unwrap().pm10_atm, 57);

        // Wake on the first poll, sleep right after the accepted reading.
        let mut expected = WAKE_CMD.to_vec();
        expected.extend_from_slice(&SLEEP_CMD);
        assert_eq!(stream.written(), &expected[..]);
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn any_corrupt_byte_fails_the_checksum() {
        let frame = reading_frame([12, 34, 56, 13, 35, 57, 100, 90, 80, 70, 213, 455, 0]);
        for i in 4..32 {
            let mut corrupt = frame;
            corrupt[i] ^= 0x01;
            let mut stream = MockStream::new(&corrupt);
            let clock = FixedClock::at(0);

            let mut sensor = Pms5003t::new(&mut stream, NoopDelay, &clock);
            let err = sensor.poll().unwrap_err();
            assert!(
                matches!(err, ReadError::ChecksumMismatch { .. }),
                "byte {i}: {err:?}"
            );
        }
    }

    #[test]
    fn acknowledgements_are_consumed_silently() {
        let ack = [0x42, 0x4D, 0x00, 0x04, 0xE4, 0x01, 0x01, 0x78];
        let mut stream = MockStream::new(&ack);
        let clock = FixedClock::at(0);

        let mut sensor = Pms5003t::new(&mut stream, NoopDelay, &clock);
        assert_eq!(sensor.poll().unwrap(), None);
        drop(sensor);
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn zero_readings_are_discarded_without_sleeping() {
        let frame = reading_frame([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 213, 455, 0]);
        let mut stream = MockStream::new(&frame);
        let clock = FixedClock::at(0);

        let mut called = false;
        let mut handler = |_: &PmReading| called = true;
        {
            let mut sensor = Pms5003t::new(&mut stream, NoopDelay, &clock);
            sensor.set_handler(&mut handler);
            assert_eq!(sensor.poll().unwrap(), None);
        }
        assert!(!called);
        // Only the initial wake command went out, no sleep afterwards.
        assert_eq!(stream.written(), &WAKE_CMD[..]);
    }

    #[test]
    fn unexpected_payload_lengths_are_drained() {
        let input = [0x42, 0x4D, 0x00, 0x10, 0xAA, 0xBB, 0xCC];
        let mut stream = MockStream::new(&input);
        let clock = FixedClock::at(0);

        let mut sensor = Pms5003t::new(&mut stream, NoopDelay, &clock);
        assert_eq!(
            sensor.poll().unwrap_err(),
            ReadError::UnexpectedLength { len: 16 }
        );
        drop(sensor);
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn garbage_start_bytes_are_skipped() {
        let mut stream = MockStream::new(&[0x13, 0xAA, 0xBB]);
        let clock = FixedClock::at(0);
        {
            let mut sensor = Pms5003t::new(&mut stream, NoopDelay, &clock);
            assert_eq!(sensor.poll().unwrap(), None);
        }
        assert_eq!(stream.remaining(), 0);

        // A correct first byte does not save a wrong second one.
        let mut stream = MockStream::new(&[0x42, 0x99, 0x01, 0x02]);
        {
            let mut sensor = Pms5003t::new(&mut stream, NoopDelay, &clock);
            assert_eq!(sensor.poll().unwrap(), None);
        }
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn wake_timer_fires_only_after_the_sleep_period() {
        let clock = FixedClock::at(5_000);
        let mut stream = MockStream::new(&[]);
        let mut sensor = Pms5003t::new(&mut stream, NoopDelay, &clock);

        // First poll wakes the sensor that might still be asleep.
        sensor.poll().unwrap();
        sensor.set_sleep(true).unwrap();

        clock.advance(WAKE_DELAY_MS - 1);
        sensor.poll().unwrap();
        clock.advance(1);
        sensor.poll().unwrap();
        drop(sensor);

        let written = stream.written();
        assert_eq!(written.len(), 3 * WAKE_CMD.len());
        assert_eq!(&written[..7], &WAKE_CMD[..]);
        assert_eq!(&written[7..14], &SLEEP_CMD[..]);
        // The second wake only went out once the deadline passed.
        assert_eq!(&written[14..], &WAKE_CMD[..]);
    }
}
