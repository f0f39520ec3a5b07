#![deny(unsafe_code)]
#![deny(warnings)]
//! SSD1306 128x32 OLED FeatherWing

use defmt::Format;
use embedded_graphics::{
    mono_font::{ascii::FONT_9X15, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use hal_abstractions::TextDisplay;
use ssd1306::{mode::BufferedGraphicsMode, prelude::*, I2CDisplayInterface, Ssd1306};

use crate::bus::{self, I2cBus, I2cCompat, SharedI2c};

/// Width of one sampling progress tick
const TICK_WIDTH: u32 = 10;

type Oled = Ssd1306<
    I2CInterface<I2cCompat<SharedI2c>>,
    DisplaySize128x32,
    BufferedGraphicsMode<DisplaySize128x32>,
>;

/// Display errors
#[derive(Debug, Clone, Copy, Format)]
pub enum DisplayError {
    /// Controller did not accept the init sequence
    InitFailed,
    /// I2C error while drawing
    HardwareError,
}

const fn rotation(inverted: bool) -> DisplayRotation {
    if inverted {
        DisplayRotation::Rotate180
    } else {
        DisplayRotation::Rotate0
    }
}

/// The OLED on the shared I2C bus
pub struct OledDisplay {
    oled: Oled,
}

impl OledDisplay {
    pub fn new(bus: &'static I2cBus) -> Self {
        let interface = I2CDisplayInterface::new(bus::device(bus));
        Self {
            oled: Ssd1306::new(interface, DisplaySize128x32, DisplayRotation::Rotate0)
                .into_buffered_graphics_mode(),
        }
    }

    fn style() -> MonoTextStyle<'static, BinaryColor> {
        MonoTextStyle::new(&FONT_9X15, BinaryColor::On)
    }
}

impl TextDisplay for OledDisplay {
    type Error = DisplayError;

    fn init(&mut self, inverted: bool) -> Result<(), DisplayError> {
        self.oled.init().map_err(|_| DisplayError::InitFailed)?;
        self.oled
            .set_rotation(rotation(inverted))
            .map_err(|_| DisplayError::InitFailed)?;
        self.oled
            .clear(BinaryColor::Off)
            .map_err(|_| DisplayError::HardwareError)?;
        self.oled.flush().map_err(|_| DisplayError::HardwareError)
    }

    fn show(&mut self, text: &str) -> Result<(), DisplayError> {
        self.oled
            .clear(BinaryColor::Off)
            .map_err(|_| DisplayError::HardwareError)?;
        Text::with_baseline(text, Point::zero(), Self::style(), Baseline::Top)
            .draw(&mut self.oled)
            .map_err(|_| DisplayError::HardwareError)?;
        self.oled.flush().map_err(|_| DisplayError::HardwareError)
    }

    fn set_inverted(&mut self, inverted: bool) -> Result<(), DisplayError> {
        self.oled
            .set_rotation(rotation(inverted))
            .map_err(|_| DisplayError::HardwareError)?;
        self.oled.flush().map_err(|_| DisplayError::HardwareError)
    }

    /// One block per reading along the bottom edge
    fn show_progress(&mut self, step: usize) -> Result<(), DisplayError> {
        if step == 0 {
            self.oled
                .clear(BinaryColor::Off)
                .map_err(|_| DisplayError::HardwareError)?;
        }
        let x = i32::try_from(step).unwrap_or(0) * TICK_WIDTH as i32;
        Rectangle::new(Point::new(x, 24), Size::new(TICK_WIDTH - 2, 6))
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
            .draw(&mut self.oled)
            .map_err(|_| DisplayError::HardwareError)?;
        self.oled.flush().map_err(|_| DisplayError::HardwareError)
    }

    fn power_down(&mut self) {
        if self.oled.set_display_on(false).is_err() {
            defmt::warn!("Display did not acknowledge power-down");
        }
    }
}
