//! Status screen for the ILI9342C panel.
//!
//! Two pages: live values colored by their air-quality band, and a
//! diagnostics page with the raw counters. The front button cycles
//! between them.

use aeris_core::config::StationConfig;
use aeris_core::event::{AirQuality, StationEvent};
use aeris_core::sensors::{Co2Reading, PmReading};
use core::fmt::Write;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_10X20;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::Text;
use heapless::String;

pub const DISPLAY_WIDTH: u16 = 320;
pub const DISPLAY_HEIGHT: u16 = 240;

/// Text baseline of the boot banner.
const BANNER_Y: i32 = 24;
/// Text baseline of the first data row.
const FIRST_ROW_Y: i32 = 72;
/// Vertical distance between data row baselines.
const ROW_HEIGHT: i32 = 40;
const MARGIN: i32 = 8;

/// Latest reading from each sensor, if one arrived yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentValues {
    pub co2: Option<Co2Reading>,
    pub pm: Option<PmReading>,
}

impl CurrentValues {
    /// Worst air-quality band across everything currently known, or
    /// `None` before the first reading.
    pub fn quality(&self, config: &StationConfig) -> Option<AirQuality> {
        let co2 = self
            .co2
            .map(|reading| AirQuality::from_co2(reading.ppm_corrected, config));
        let pm = self
            .pm
            .map(|reading| AirQuality::from_pm2_5(reading.pm2_5_atm, config));
        match (co2, pm) {
            (Some(a), Some(b)) => Some(a.combine(b)),
            (co2, pm) => co2.or(pm),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    /// Live values with their quality bands.
    Values,
    /// Raw counters, useful during bring-up.
    Diagnostics,
}

impl Page {
    fn next(self) -> Self {
        match self {
            Self::Values => Self::Diagnostics,
            Self::Diagnostics => Self::Values,
        }
    }
}

/// Owns the draw target and the state painted onto it.
pub struct StatusScreen<D> {
    display: D,
    page: Page,
    values: CurrentValues,
}

impl<D> StatusScreen<D>
where
    D: DrawTarget<Color = Rgb565>,
{
    pub fn new(display: D) -> Self {
        Self {
            display,
            page: Page::Values,
            values: CurrentValues::default(),
        }
    }

    /// Clears the panel and paints the boot banner.
    pub fn draw_banner(&mut self) -> Result<(), D::Error> {
        self.display.clear(Rgb565::BLACK)?;
        Text::new(
            concat!("aeris ", env!("CARGO_PKG_VERSION")),
            Point::new(MARGIN, BANNER_Y),
            MonoTextStyle::new(&FONT_10X20, Rgb565::WHITE),
        )
        .draw(&mut self.display)?;
        Ok(())
    }

    /// Folds one event into the screen state. Cheap; the expensive part
    /// is [`redraw`](Self::redraw).
    pub fn handle(&mut self, event: &StationEvent) {
        match event {
            StationEvent::Co2(reading) => self.values.co2 = Some(*reading),
            StationEvent::Pm(reading) => self.values.pm = Some(*reading),
            StationEvent::ButtonPressed => {
                self.page = self.page.next();
                log::info!("switching to the {:?} page", self.page);
            }
        }
    }

    pub fn redraw(&mut self, config: &StationConfig, uptime_secs: u64) -> Result<(), D::Error> {
        match self.page {
            Page::Values => self.draw_values(config),
            Page::Diagnostics => self.draw_diagnostics(uptime_secs),
        }
    }

    fn draw_values(&mut self, config: &StationConfig) -> Result<(), D::Error> {
        let mut line: String<48> = String::new();

        match self.values.co2 {
            Some(reading) => {
                let band = AirQuality::from_co2(reading.ppm_corrected, config);
                let _ = write!(line, "CO2  {} ppm  {}", reading.ppm_corrected, band.label());
                self.draw_row(0, &line, quality_color(band))?;
            }
            None => self.draw_row(0, "CO2  waiting", Rgb565::CSS_GRAY)?,
        }

        line.clear();
        match self.values.pm {
            Some(reading) => {
                let band = AirQuality::from_pm2_5(reading.pm2_5_atm, config);
                let _ = write!(line, "PM2.5  {} ug/m3  {}", reading.pm2_5_atm, band.label());
                self.draw_row(1, &line, quality_color(band))?;
            }
            None => self.draw_row(1, "PM2.5  waiting", Rgb565::CSS_GRAY)?,
        }

        line.clear();
        match self.values.pm {
            Some(reading) => {
                let _ = write!(
                    line,
                    "{:.1} C  {:.1} %RH",
                    reading.temperature(),
                    reading.humidity()
                );
                self.draw_row(2, &line, Rgb565::WHITE)?;
            }
            None => self.draw_row(2, "--.- C  --.- %RH", Rgb565::CSS_GRAY)?,
        }

        line.clear();
        match self.values.quality(config) {
            Some(overall) => {
                let _ = write!(line, "Air: {}", overall.label());
                self.draw_row(3, &line, quality_color(overall))?;
            }
            None => self.draw_row(3, "Air: unknown", Rgb565::CSS_GRAY)?,
        }
        Ok(())
    }

    fn draw_diagnostics(&mut self, uptime_secs: u64) -> Result<(), D::Error> {
        let mut line: String<48> = String::new();

        let _ = write!(line, "up {uptime_secs} s");
        self.draw_row(0, &line, Rgb565::WHITE)?;

        line.clear();
        match self.values.co2 {
            Some(reading) => {
                let _ = write!(
                    line,
                    "co2 raw {} corr {}",
                    reading.ppm_raw, reading.ppm_corrected
                );
                self.draw_row(1, &line, Rgb565::WHITE)?;
            }
            None => self.draw_row(1, "co2 waiting", Rgb565::CSS_GRAY)?,
        }

        line.clear();
        match self.values.co2 {
            Some(reading) => {
                let _ = write!(
                    line,
                    "co2 t {} unk {:#06x}",
                    reading.temperature, reading.unknown
                );
                self.draw_row(2, &line, Rgb565::WHITE)?;
            }
            None => self.draw_row(2, "", Rgb565::WHITE)?,
        }

        line.clear();
        match self.values.pm {
            Some(reading) => {
                let _ = write!(
                    line,
                    "cnt 0.3u {}  2.5u {}",
                    reading.pm0_3_cnt, reading.pm2_5_cnt
                );
                self.draw_row(3, &line, Rgb565::WHITE)?;
            }
            None => self.draw_row(3, "pm waiting", Rgb565::CSS_GRAY)?,
        }
        Ok(())
    }

    /// Blanks one row strip and draws `text` over it.
    fn draw_row(&mut self, index: i32, text: &str, color: Rgb565) -> Result<(), D::Error> {
        let y = FIRST_ROW_Y + ROW_HEIGHT * index;
        Rectangle::new(
            Point::new(0, y - 20),
            Size::new(u32::from(DISPLAY_WIDTH), 28),
        )
        .into_styled(PrimitiveStyle::with_fill(Rgb565::BLACK))
        .draw(&mut self.display)?;
        Text::new(
            text,
            Point::new(MARGIN, y),
            MonoTextStyle::new(&FONT_10X20, color),
        )
        .draw(&mut self.display)?;
        Ok(())
    }
}

/// Panel color for each quality band.
fn quality_color(quality: AirQuality) -> Rgb565 {
    match quality {
        AirQuality::Excellent => Rgb565::CSS_GREEN,
        AirQuality::Good => Rgb565::CSS_LIGHT_GREEN,
        AirQuality::Poor => Rgb565::CSS_ORANGE,
        AirQuality::Bad => Rgb565::CSS_RED,
    }
}
