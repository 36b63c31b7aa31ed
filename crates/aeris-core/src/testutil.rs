//! Shared test doubles: a scriptable byte stream, counting delays and a
//! manually advanced clock.

use core::convert::Infallible;
use core::sync::atomic::{AtomicU64, Ordering};

use embedded_hal::delay::DelayNs;

use crate::clock::MonotonicClock;

/// In-memory stream: reads come from a scripted input buffer, writes are
/// captured for inspection.
pub(crate) struct MockStream {
    input: heapless::Vec<u8, 256>,
    cursor: usize,
    written: heapless::Vec<u8, 64>,
    ready_after_polls: usize,
    polls: usize,
}

impl MockStream {
    pub fn new(input: &[u8]) -> Self {
        Self::delayed(input, 0)
    }

    /// A stream whose input only becomes readable after `ready_after_polls`
    /// readiness checks have reported it empty.
    pub fn delayed(input: &[u8], ready_after_polls: usize) -> Self {
        let mut buffered = heapless::Vec::new();
        buffered.extend_from_slice(input).unwrap();
        Self {
            input: buffered,
            cursor: 0,
            written: heapless::Vec::new(),
            ready_after_polls,
            polls: 0,
        }
    }

    /// Everything written to the stream so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Input bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.input.len() - self.cursor
    }
}

impl embedded_io::ErrorType for MockStream {
    type Error = Infallible;
}

impl embedded_io::Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let available = &self.input[self.cursor..];
        let take = available.len().min(buf.len());
        buf[..take].copy_from_slice(&available[..take]);
        self.cursor += take;
        Ok(take)
    }
}

impl embedded_io::ReadReady for MockStream {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        if self.polls < self.ready_after_polls {
            self.polls += 1;
            return Ok(false);
        }
        Ok(self.cursor < self.input.len())
    }
}

impl embedded_io::Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for &byte in buf {
            let _ = self.written.push(byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Delay that does nothing.
pub(crate) struct NoopDelay;

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_us(&mut self, _us: u32) {}

    fn delay_ms(&mut self, _ms: u32) {}
}

/// Delay that counts how often it was invoked instead of sleeping.
pub(crate) struct CountingDelay {
    pub sleeps: u32,
}

impl CountingDelay {
    pub fn new() -> Self {
        Self { sleeps: 0 }
    }
}

impl DelayNs for CountingDelay {
    fn delay_ns(&mut self, _ns: u32) {
        self.sleeps += 1;
    }

    fn delay_us(&mut self, _us: u32) {
        self.sleeps += 1;
    }

    fn delay_ms(&mut self, _ms: u32) {
        self.sleeps += 1;
    }
}

/// Clock that only moves when the test advances it.
pub(crate) struct FixedClock(AtomicU64);

impl FixedClock {
    pub fn at(millis: u64) -> Self {
        Self(AtomicU64::new(millis))
    }

    pub fn advance(&self, millis: u64) {
        self.0.fetch_add(millis, Ordering::Relaxed);
    }
}

impl MonotonicClock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
