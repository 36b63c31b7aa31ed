//! Byte-level frame recovery for the sensor UARTs.
//!
//! Both sensors speak fixed start-byte framed protocols over lossy serial
//! links, so the logic for waiting on data, resynchronizing to a start byte
//! and reading an exact number of bytes lives here, shared by the drivers.

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady};
use log::{debug, warn};

use crate::error::ReadError;

/// How long to sleep between polls of an idle stream.
pub const POLL_INTERVAL_MS: u32 = 100;

/// How many [`POLL_INTERVAL_MS`] sleeps to spend before giving up on a read.
pub const MAX_POLLS: u32 = 10;

/// How many discarded bytes to keep around for the log line that reports
/// them.
pub const DISCARD_LOG_BYTES: usize = 32;

/// Formats bytes as ` XX YY ZZ`, the shape all frame dumps use.
pub(crate) struct HexBytes<'a>(pub(crate) &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, " {byte:02X}")?;
        }
        Ok(())
    }
}

/// Bytes thrown away while discarding garbage or resynchronizing.
///
/// Keeps the first [`DISCARD_LOG_BYTES`] bytes for logging and counts the
/// rest, so a flood of junk cannot blow up a log line.
#[derive(Debug, Default)]
pub struct Drained {
    sample: heapless::Vec<u8, DISCARD_LOG_BYTES>,
    total: usize,
}

impl Drained {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, byte: u8) {
        let _ = self.sample.push(byte);
        self.total += 1;
    }

    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(byte);
        }
    }

    /// Whether nothing was discarded.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Total number of discarded bytes, including ones not sampled.
    pub fn total(&self) -> usize {
        self.total
    }
}

impl fmt::Display for Drained {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", HexBytes(&self.sample))?;
        if self.total > self.sample.len() {
            write!(f, " (+{} more)", self.total - self.sample.len())?;
        }
        Ok(())
    }
}

/// Reads and discards everything currently buffered on `stream`.
///
/// Called after a failed frame so the next read starts from a clean slate
/// instead of chewing through the tail of a corrupt frame.
pub fn drain<S: Read + ReadReady>(stream: &mut S) -> Result<Drained, ReadError> {
    let mut drained = Drained::new();
    let mut chunk = [0u8; 16];
    while stream.read_ready().map_err(ReadError::io)? {
        let read = stream.read(&mut chunk).map_err(ReadError::io)?;
        if read == 0 {
            break;
        }
        drained.extend(&chunk[..read]);
    }
    Ok(drained)
}

/// Polls `stream` until it has data, sleeping between polls, for at most
/// [`MAX_POLLS`] sleeps. Returns whether data became available.
fn wait_within_budget<S: ReadReady, D: DelayNs>(
    stream: &mut S,
    delay: &mut D,
) -> Result<bool, ReadError> {
    let mut polls = 0;
    while !stream.read_ready().map_err(ReadError::io)? {
        if polls == MAX_POLLS {
            return Ok(false);
        }
        delay.delay_ms(POLL_INTERVAL_MS);
        polls += 1;
    }
    Ok(true)
}

/// Waits for `stream` to have data, failing with [`ReadError::NoResponse`]
/// once the polling budget runs out.
pub fn wait_for_data<S: ReadReady, D: DelayNs>(
    stream: &mut S,
    delay: &mut D,
) -> Result<(), ReadError> {
    if wait_within_budget(stream, delay)? {
        Ok(())
    } else {
        warn!("no response after {} ms", MAX_POLLS * POLL_INTERVAL_MS);
        Err(ReadError::NoResponse)
    }
}

/// Fills `buf` completely, waiting out short pauses between chunks.
///
/// Each chunk gets a fresh polling budget. If the stream stays silent for a
/// whole budget, whatever is left over is drained and the read fails with
/// [`ReadError::Incomplete`].
pub fn read_exact<S: Read + ReadReady, D: DelayNs>(
    stream: &mut S,
    delay: &mut D,
    buf: &mut [u8],
) -> Result<(), ReadError> {
    let wanted = buf.len();
    let mut got = 0;
    while got < wanted {
        if !wait_within_budget(stream, delay)? {
            break;
        }
        let read = stream.read(&mut buf[got..]).map_err(ReadError::io)?;
        if read == 0 {
            break;
        }
        got += read;
    }
    if got < wanted {
        drain(stream)?;
        return Err(ReadError::Incomplete { got, wanted });
    }
    Ok(())
}

/// Reads one `frame.len()`-byte frame that begins with `start_byte`.
///
/// Scans past any garbage in front of the start byte, logging what was
/// skipped. The start byte itself lands in `frame[0]`.
pub fn read_frame<S: Read + ReadReady, D: DelayNs>(
    stream: &mut S,
    delay: &mut D,
    start_byte: u8,
    frame: &mut [u8],
) -> Result<(), ReadError> {
    wait_for_data(stream, delay)?;

    let mut skipped = Drained::new();
    loop {
        if !stream.read_ready().map_err(ReadError::io)? {
            return resync_failed(skipped, frame.len());
        }
        let mut byte = [0u8; 1];
        if stream.read(&mut byte).map_err(ReadError::io)? == 0 {
            return resync_failed(skipped, frame.len());
        }
        if byte[0] == start_byte {
            break;
        }
        skipped.push(byte[0]);
    }
    if !skipped.is_empty() {
        warn!("skipping unexpected readings:{skipped}");
    }

    frame[0] = start_byte;
    let body_len = frame.len();
    read_exact(stream, delay, &mut frame[1..]).map_err(|err| match err {
        // Account for the start byte we already consumed.
        ReadError::Incomplete { got, .. } => ReadError::Incomplete {
            got: got + 1,
            wanted: body_len,
        },
        other => other,
    })?;
    debug!("  <<{}", HexBytes(frame));
    Ok(())
}

/// The stream ran dry before a start byte appeared.
fn resync_failed(skipped: Drained, wanted: usize) -> Result<(), ReadError> {
    if !skipped.is_empty() {
        warn!("skipping unexpected readings:{skipped}");
    }
    Err(ReadError::Incomplete { got: 0, wanted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{CountingDelay, MockStream};

    #[test]
    fn read_frame_resyncs_past_garbage() {
        let mut stream = MockStream::new(&[0xAA, 0xBB, 0xCC, 0xFF, 0x01, 0x02, 0x03]);
        let mut delay = CountingDelay::new();
        let mut frame = [0u8; 4];

        read_frame(&mut stream, &mut delay, 0xFF, &mut frame).unwrap();
        assert_eq!(frame, [0xFF, 0x01, 0x02, 0x03]);
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn read_frame_times_out_after_the_polling_budget() {
        let mut stream = MockStream::new(&[]);
        let mut delay = CountingDelay::new();
        let mut frame = [0u8; 4];

        let err = read_frame(&mut stream, &mut delay, 0xFF, &mut frame).unwrap_err();
        assert_eq!(err, ReadError::NoResponse);
        assert_eq!(delay.sleeps, MAX_POLLS);
    }

    #[test]
    fn read_frame_waits_for_data_that_arrives_late() {
        let mut stream = MockStream::delayed(&[0xFF, 0x01, 0x02, 0x03], 3);
        let mut delay = CountingDelay::new();
        let mut frame = [0u8; 4];

        read_frame(&mut stream, &mut delay, 0xFF, &mut frame).unwrap();
        assert_eq!(frame, [0xFF, 0x01, 0x02, 0x03]);
        assert_eq!(delay.sleeps, 3);
    }

    #[test]
    fn garbage_with_no_start_byte_fails_without_polling_again() {
        let mut stream = MockStream::new(&[0xAA, 0xBB]);
        let mut delay = CountingDelay::new();
        let mut frame = [0u8; 4];

        let err = read_frame(&mut stream, &mut delay, 0xFF, &mut frame).unwrap_err();
        assert_eq!(err, ReadError::Incomplete { got: 0, wanted: 4 });
        assert_eq!(delay.sleeps, 0);
    }

    #[test]
    fn short_frame_reports_bytes_received_including_start_byte() {
        let mut stream = MockStream::new(&[0xFF, 0x01]);
        let mut delay = CountingDelay::new();
        let mut frame = [0u8; 4];

        let err = read_frame(&mut stream, &mut delay, 0xFF, &mut frame).unwrap_err();
        assert_eq!(err, ReadError::Incomplete { got: 2, wanted: 4 });
    }

    #[test]
    fn drained_display_samples_and_counts() {
        let mut drained = Drained::new();
        for byte in 0..40u8 {
            drained.push(byte);
        }
        let rendered = std::format!("{drained}");
        assert!(rendered.starts_with(" 00 01 02"));
        assert!(rendered.ends_with("(+8 more)"));
        assert_eq!(drained.total(), 40);
    }
}
