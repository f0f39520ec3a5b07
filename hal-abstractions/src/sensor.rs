#![deny(unsafe_code)]
#![deny(warnings)]
//! Ranging sensor and battery monitor ports

use crate::PortError;

/// Port for a single-shot distance ranger (VL53L0X or similar)
///
/// Readings are in millimetres. A driver that reports "no target" as zero
/// may return `Ok(0)`; the sampler treats zero the same as a failed read.
pub trait RangeSensor {
    /// Error returned by the driver
    type Error: PortError;

    /// Power the ranger up and run its init sequence
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Take one blocking range measurement
    fn read_mm(&mut self) -> Result<u16, Self::Error>;

    /// Cut power to the ranger (XSHUT low) ahead of deep sleep
    fn power_down(&mut self);
}

/// Port for the supply-voltage ADC
pub trait BatteryMonitor {
    /// Raw ADC count, scaled so a freshly charged cell reads about 3686
    fn read_raw(&mut self) -> u16;
}
