#![deny(unsafe_code)]
#![deny(warnings)]
//! Text display / indicator port

use crate::PortError;

/// Port for a small text display such as a 128x32 SSD1306
///
/// The driver picks the font size from the text length; callers only say
/// what to show.
pub trait TextDisplay {
    /// Error returned by the driver
    type Error: PortError;

    /// Power the panel up and clear it; `inverted` rotates it 180 degrees
    fn init(&mut self, inverted: bool) -> Result<(), Self::Error>;

    /// Replace the screen contents with `text`
    fn show(&mut self, text: &str) -> Result<(), Self::Error>;

    /// Rotate the panel 180 degrees (or back)
    fn set_inverted(&mut self, inverted: bool) -> Result<(), Self::Error>;

    /// Mark progress through a multi-step operation (one dot per sample)
    fn show_progress(&mut self, _step: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Cut power to the panel ahead of deep sleep
    fn power_down(&mut self);
}
