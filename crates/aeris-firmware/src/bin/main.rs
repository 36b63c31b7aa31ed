#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use aeris_core::clock::EmbassyClock;
use aeris_core::config::StationConfig;
use aeris_core::event::{StationEvent, publish};
use aeris_core::sensors::{Mhz19b, PmReading, Pms5003t};
use aeris_firmware::console::{self, ConsoleSink};
use aeris_firmware::display::{DISPLAY_HEIGHT, DISPLAY_WIDTH, StatusScreen};
use aeris_firmware::{EVENTS, status_led};
use embassy_executor::Spawner;
use embassy_time::{Duration, Instant, Ticker, Timer};
use esp_hal::Blocking;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, Uart};
use esp_hal::usb_serial_jtag::UsbSerialJtag;
use log::{LevelFilter, debug, error, info, warn};
use rtt_target::rprintln;

// Display-LCD panel specific imports
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use mipidsi::interface::SpiInterface;
use mipidsi::{Builder as MipidsiBuilder, models::ILI9342CRgb565};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// Requests a CO2 measurement on a fixed cadence and publishes every good
/// reading.
#[embassy_executor::task]
async fn co2_task(uart: Uart<'static, Blocking>, config: StationConfig) {
    let mut sensor = Mhz19b::new(uart, embassy_time::Delay);
    if let Err(err) = sensor.set_abc(config.co2_abc_enabled) {
        error!("failed to set CO2 automatic baseline correction: {err}");
    }

    let mut ticker = Ticker::every(Duration::from_secs(config.co2_poll_secs));
    loop {
        ticker.next().await;
        match sensor.read() {
            Ok(reading) => publish(&EVENTS, StationEvent::Co2(reading)),
            Err(err) => warn!("CO2 read failed: {err}"),
        }
    }
}

/// Drives the particulate sensor's wake/read/sleep cycle. The driver
/// paces itself through its wake timer; this task only has to keep
/// polling.
#[embassy_executor::task]
async fn pm_task(uart: Uart<'static, Blocking>) {
    let mut deliver = |reading: &PmReading| publish(&EVENTS, StationEvent::Pm(*reading));
    let mut sensor = Pms5003t::new(uart, embassy_time::Delay, EmbassyClock);
    sensor.set_handler(&mut deliver);

    let mut ticker = Ticker::every(Duration::from_millis(10));
    loop {
        ticker.next().await;
        if let Err(err) = sensor.poll() {
            warn!("particulate poll failed: {err}");
        }
    }
}

/// Debounced page-cycle button.
#[embassy_executor::task]
async fn button_task(mut button: Input<'static>) {
    loop {
        button.wait_for_falling_edge().await;
        Timer::after(Duration::from_millis(30)).await;
        if button.is_low() {
            publish(&EVENTS, StationEvent::ButtonPressed);
        }
        button.wait_for_rising_edge().await;
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    // generator version: 1.2.0

    rtt_target::rtt_init_print!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    rprintln!("Embassy initialized!");

    // Bring the USB console up first so nothing below logs into the void.
    let (rx, tx) = UsbSerialJtag::new(peripherals.USB_DEVICE).split();
    console::init(LevelFilter::Debug);
    spawner.spawn(console::drain_task(ConsoleSink::new(tx))).ok();
    spawner.spawn(console::echo_task(rx.into_async())).ok();

    let station = StationConfig::default();
    info!("station config: {station:?}");

    // CO2 sensor on UART1
    let co2_uart = Uart::new(peripherals.UART1, UartConfig::default().with_baudrate(9600))
        .unwrap()
        .with_rx(peripherals.GPIO17)
        .with_tx(peripherals.GPIO18);
    spawner.spawn(co2_task(co2_uart, station)).ok();

    // Particulate sensor on UART2
    let pm_uart = Uart::new(peripherals.UART2, UartConfig::default().with_baudrate(9600))
        .unwrap()
        .with_rx(peripherals.GPIO15)
        .with_tx(peripherals.GPIO16);
    spawner.spawn(pm_task(pm_uart)).ok();

    // Page-cycle button on the boot button pin
    let button = Input::new(peripherals.GPIO0, InputConfig::default().with_pull(Pull::Up));
    spawner.spawn(button_task(button)).ok();

    spawner
        .spawn(status_led::breathe_task(peripherals.LEDC, peripherals.GPIO4))
        .ok();

    // Configure and initialize the display

    // 1. Configure SPI bus
    let spi_bus = Spi::new(peripherals.SPI2, SpiConfig::default())
        .unwrap()
        .with_sck(peripherals.GPIO36)
        .with_mosi(peripherals.GPIO37);

    // 2. Create a dummy CS pin (we don't use hardware CS for this display)
    let cs = Output::new(peripherals.GPIO35, Level::High, OutputConfig::default());

    // 3. Wrap the SPI bus as a SPI device (required by embedded-hal traits)
    let spi_device = ExclusiveDevice::new_no_delay(spi_bus, cs).unwrap();

    // 4. Set up DC (Data/Command) pin
    let dc = Output::new(peripherals.GPIO34, Level::Low, OutputConfig::default());

    // 5. Create a buffer for SPI batching (larger = faster, uses more RAM)
    let mut spi_buffer = [0u8; 64];

    // 6. Create display interface
    let di = SpiInterface::new(spi_device, dc, &mut spi_buffer);

    // 7. Build and initialize the display driver
    let display = MipidsiBuilder::new(ILI9342CRgb565, di)
        .display_size(DISPLAY_WIDTH, DISPLAY_HEIGHT)
        .init(&mut embassy_time::Delay)
        .expect("Failed to initialize display");

    rprintln!("Display initialized!");

    let mut screen = StatusScreen::new(display);
    if screen.draw_banner().is_err() {
        error!("display write failed while drawing the boot banner");
    }

    // Main doubles as the display task.
    let mut ticker = Ticker::every(Duration::from_millis(250));
    let mut ticks: u32 = 0;
    loop {
        ticker.next().await;

        for event in EVENTS.consume() {
            screen.handle(&event);
        }
        if screen.redraw(&station, Instant::now().as_secs()).is_err() {
            error!("display write failed during redraw");
        }

        ticks = ticks.wrapping_add(1);
        if ticks % 240 == 0 {
            debug!("heartbeat: up {} s", Instant::now().as_secs());
        }
    }
}
