#![deny(unsafe_code)]
#![deny(warnings)]
//! VL53L0X time-of-flight ranger
//!
//! XSHUT is wired to a GPIO so the ranger can be held in shutdown while the
//! MCU is in standby. Every `init` after a power-down reloads the driver,
//! since XSHUT low wipes the ranger's calibration.

use defmt::{debug, Format};
use embassy_stm32::gpio::Output;
use hal_abstractions::RangeSensor;
use vl53l0x::VL53L0x;

use crate::bus::{self, I2cBus, I2cCompat, SharedI2c};

/// Readings at or above this mean "no target in range"
const OUT_OF_RANGE_MM: u16 = 8190;

/// Ranger boot time after XSHUT release (1.2 ms max), in core cycles at 84 MHz
const BOOT_CYCLES: u32 = 168_000;

/// Per-reading timing budget; longer is more accurate
const TIMING_BUDGET_US: u32 = 200_000;

/// Ranger errors
#[derive(Debug, Clone, Copy, Format)]
pub enum SensorError {
    /// `read_mm` before a successful `init`
    NotInitialized,
    /// Ranger did not answer during bring-up
    InitFailed,
    /// I2C error while ranging
    HardwareError,
    /// Nothing within range
    OutOfRange,
}

/// VL53L0X on the shared I2C bus
pub struct Vl53l0xSensor {
    bus: &'static I2cBus,
    xshut: Output<'static>,
    ranger: Option<VL53L0x<I2cCompat<SharedI2c>>>,
}

impl Vl53l0xSensor {
    pub fn new(bus: &'static I2cBus, xshut: Output<'static>) -> Self {
        Self {
            bus,
            xshut,
            ranger: None,
        }
    }
}

impl RangeSensor for Vl53l0xSensor {
    type Error = SensorError;

    fn init(&mut self) -> Result<(), SensorError> {
        self.xshut.set_high();
        cortex_m::asm::delay(BOOT_CYCLES);

        let mut ranger =
            VL53L0x::new(bus::device(self.bus)).map_err(|_| SensorError::InitFailed)?;
        if ranger
            .set_measurement_timing_budget(TIMING_BUDGET_US)
            .is_err()
        {
            debug!("Ranger kept its default timing budget");
        }
        self.ranger = Some(ranger);
        Ok(())
    }

    fn read_mm(&mut self) -> Result<u16, SensorError> {
        let ranger = self.ranger.as_mut().ok_or(SensorError::NotInitialized)?;
        let mm = ranger
            .read_range_single_millimeters_blocking()
            .map_err(|_| SensorError::HardwareError)?;
        if mm >= OUT_OF_RANGE_MM {
            return Err(SensorError::OutOfRange);
        }
        Ok(mm)
    }

    fn power_down(&mut self) {
        self.ranger = None;
        self.xshut.set_low();
    }
}
