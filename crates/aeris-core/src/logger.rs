//! Asynchronous buffered logging behind the [`log`] facade.
//!
//! Log formatting happens on the caller's task into a fixed-size line, which
//! is then queued. A single consumer task periodically flushes the backlog to
//! the actual output. Serial output is slow enough that doing it inline would
//! stall whichever task happens to log; queueing moves that cost to a task
//! that has nothing better to do.

use core::fmt::{self, Write as _};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{Log, Metadata, Record};

use crate::clock::MonotonicClock;
use crate::queue::{BoundedQueue, ThreadSafeQueue};

/// The maximum length of a log line. Longer lines are cut off.
pub const LINE_LEN: usize = 128;

/// The maximum number of log lines the logger buffers.
pub const BUFFER_LEN: usize = 10;

/// How many milliseconds consumers should sleep between
/// [`AsyncLogger::flush_to`] calls.
pub const WRITE_DELAY_MS: u64 = 100;

/// One formatted log line in a fixed buffer.
#[derive(Debug, Clone, Copy)]
pub struct LogLine {
    data: [u8; LINE_LEN],
    cursor: usize,
}

impl LogLine {
    pub const fn new() -> Self {
        Self {
            data: [0; LINE_LEN],
            cursor: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// The formatted text. The writer only ever appends complete UTF-8
    /// characters, so decoding cannot fail in practice.
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.data[..self.cursor]).unwrap_or("")
    }
}

impl Default for LogLine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for LogLine {
    /// Appends as much of `s` as fits, silently dropping the rest.
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let space = LINE_LEN - self.cursor;
        let take = if s.len() <= space {
            s.len()
        } else {
            // Cut on a character boundary so the line stays valid UTF-8.
            let mut take = space;
            while !s.is_char_boundary(take) {
                take -= 1;
            }
            take
        };
        self.data[self.cursor..self.cursor + take].copy_from_slice(&s.as_bytes()[..take]);
        self.cursor += take;
        Ok(())
    }
}

/// Milliseconds since boot rendered as `[m:ss.mmm]`.
struct Timestamp(u64);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let minutes = self.0 / 1000 / 60;
        let seconds = self.0 / 1000 % 60;
        let millis = self.0 % 1000;
        write!(f, "[{minutes}:{seconds:02}.{millis:03}]")
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Destination for flushed log lines.
pub trait LogSink {
    /// Writes one line including whatever terminator the output wants.
    fn write_line(&mut self, line: &str);
}

/// Buffering [`Log`] implementation.
///
/// Producers format into the queue through the `log` macros; some consumer
/// must call [`flush_to`](Self::flush_to) every [`WRITE_DELAY_MS`] or the
/// queue fills up and new lines get dropped.
pub struct AsyncLogger<C> {
    clock: C,
    queue: ThreadSafeQueue<CriticalSectionRawMutex, LogLine, BUFFER_LEN>,
}

impl<C: MonotonicClock> AsyncLogger<C> {
    /// Creates the logger. Usable in `static` initializers.
    pub const fn new(clock: C) -> Self {
        Self {
            clock,
            queue: ThreadSafeQueue::new(),
        }
    }

    /// Takes the queued backlog out of the logger.
    pub fn drain(&self) -> BoundedQueue<LogLine, BUFFER_LEN> {
        self.queue.consume()
    }

    /// Writes the backlog to `sink`.
    ///
    /// A full queue almost certainly means lines were dropped, so that gets
    /// reported to the sink ahead of the backlog itself.
    pub fn flush_to(&self, sink: &mut dyn LogSink) {
        if self.queue.len() == BUFFER_LEN {
            sink.write_line("WARNING: log queue was full; you may have lost log lines");
        }
        for line in &self.drain() {
            sink.write_line(line.as_str());
        }
    }
}

impl<C: MonotonicClock + Send + Sync> Log for AsyncLogger<C> {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let mut line = LogLine::new();
        let timestamp = Timestamp(self.clock.now_millis());
        let file = record.file().map(basename).unwrap_or("?");
        let line_number = record.line().unwrap_or(0);
        let _ = write!(
            line,
            "{timestamp} {file}:{line_number} ({target}) {args}",
            target = record.target(),
            args = record.args()
        );

        if line.is_empty() {
            return;
        }
        // A full queue drops the line; the consumer reports the loss.
        let _ = self.queue.add(line);
    }

    fn flush(&self) {}
}
