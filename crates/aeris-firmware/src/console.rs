//! USB serial console: buffered log output plus a line echo for checking
//! the connection is alive.

use aeris_core::clock::EmbassyClock;
use aeris_core::logger::{AsyncLogger, LogSink, WRITE_DELAY_MS};
use embassy_time::{Duration, Ticker};
use embedded_io::Write;
use esp_hal::usb_serial_jtag::{UsbSerialJtagRx, UsbSerialJtagTx};
use esp_hal::{Async, Blocking};
use log::{LevelFilter, info, warn};

/// The station-wide logger. Log macros append to its queue from any task;
/// [`drain_task`] moves the lines out over USB.
pub static LOGGER: AsyncLogger<EmbassyClock> = AsyncLogger::new(EmbassyClock);

/// Routes the `log` macros to the buffered logger. Spawn [`drain_task`]
/// afterwards or the lines pile up and the oldest survive.
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// Writes log lines to the USB serial/JTAG transmit side.
pub struct ConsoleSink {
    tx: UsbSerialJtagTx<'static, Blocking>,
}

impl ConsoleSink {
    pub fn new(tx: UsbSerialJtagTx<'static, Blocking>) -> Self {
        Self { tx }
    }
}

impl LogSink for ConsoleSink {
    fn write_line(&mut self, line: &str) {
        // Nowhere to report a console write error, so drop it.
        let _ = self.tx.write_all(line.as_bytes());
        let _ = self.tx.write_all(b"\r\n");
        let _ = self.tx.flush();
    }
}

/// Flushes the log queue to the console on a fixed cadence.
#[embassy_executor::task]
pub async fn drain_task(mut sink: ConsoleSink) {
    let mut ticker = Ticker::every(Duration::from_millis(WRITE_DELAY_MS));
    loop {
        ticker.next().await;
        LOGGER.flush_to(&mut sink);
    }
}

/// Echoes whatever arrives on the USB serial/JTAG receive side back
/// through the logger.
#[embassy_executor::task]
pub async fn echo_task(mut rx: UsbSerialJtagRx<'static, Async>) {
    let mut buffer = [0u8; 64];
    loop {
        match embedded_io_async::Read::read(&mut rx, &mut buffer).await {
            Ok(0) => {}
            Ok(read) => match core::str::from_utf8(&buffer[..read]) {
                Ok(text) => info!("I received: {}", text.trim_end()),
                Err(_) => info!("I received: {read} bytes of non-text data"),
            },
            Err(err) => warn!("console read failed: {err:?}"),
        }
    }
}
