//! Breathing status LED on the LEDC peripheral.

use embassy_time::{Duration, Ticker};
use esp_hal::ledc::channel::{self, ChannelIFace};
use esp_hal::ledc::timer::{self, TimerIFace};
use esp_hal::ledc::{LSGlobalClkSource, Ledc, LowSpeed};
use esp_hal::peripherals::{GPIO4, LEDC};
use esp_hal::time::Rate;
use log::error;

/// Duration of one duty step; a full breath is 100 steps up and 100 down.
const STEP: Duration = Duration::from_millis(20);

/// Ramps the LED duty cycle up and down forever. The PWM frequency is
/// well above flicker range, only the envelope is visible.
#[embassy_executor::task]
pub async fn breathe_task(ledc: LEDC<'static>, pin: GPIO4<'static>) {
    let mut ledc = Ledc::new(ledc);
    ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);

    let mut led_timer = ledc.timer::<LowSpeed>(timer::Number::Timer0);
    if let Err(err) = led_timer.configure(timer::config::Config {
        duty: timer::config::Duty::Duty5Bit,
        clock_source: timer::LSClockSource::APBClk,
        frequency: Rate::from_khz(24),
    }) {
        error!("status LED timer setup failed: {err:?}");
        return;
    }

    let mut led_channel = ledc.channel(channel::Number::Channel0, pin);
    if let Err(err) = led_channel.configure(channel::config::Config {
        timer: &led_timer,
        duty_pct: 0,
        pin_config: channel::config::PinConfig::PushPull,
    }) {
        error!("status LED channel setup failed: {err:?}");
        return;
    }

    let mut ticker = Ticker::every(STEP);
    loop {
        for duty in (0..=100).chain((1..100).rev()) {
            let _ = led_channel.set_duty(duty);
            ticker.next().await;
        }
    }
}
