#![deny(unsafe_code)]
#![deny(warnings)]
//! Shared I2C1 bus
//!
//! The VL53L0X ranger and the SSD1306 OLED sit on the same I2C1 pins
//! (Feather SCL = PB6, SDA = PB7). Each driver gets its own [`SharedI2c`]
//! handle onto one critical-section mutex, and both drivers still expect
//! embedded-hal 0.2 traits, so handles are wrapped in [`I2cCompat`].

use core::cell::RefCell;

use embassy_embedded_hal::shared_bus::blocking::i2c::I2cDevice;
use embassy_stm32::i2c::I2c;
use embassy_stm32::mode::Blocking;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use static_cell::StaticCell;

/// The bus itself, one per board
pub type I2cBus = Mutex<CriticalSectionRawMutex, RefCell<I2c<'static, Blocking>>>;

/// One device's view of the bus
pub type SharedI2c = I2cDevice<'static, CriticalSectionRawMutex, I2c<'static, Blocking>>;

static I2C_BUS: StaticCell<I2cBus> = StaticCell::new();

/// Park the I2C peripheral behind the shared mutex
///
/// Call once from `init`.
pub fn share(i2c: I2c<'static, Blocking>) -> &'static I2cBus {
    I2C_BUS.init(Mutex::new(RefCell::new(i2c)))
}

/// A fresh handle onto `bus` for an embedded-hal 0.2 driver
pub fn device(bus: &'static I2cBus) -> I2cCompat<SharedI2c> {
    I2cCompat(I2cDevice::new(bus))
}

/// Bridge from embedded-hal 1.0 I2C to the 0.2 blocking traits
pub struct I2cCompat<I2C>(pub I2C);

impl<I2C> embedded_hal_0_2::blocking::i2c::Write for I2cCompat<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    type Error = I2C::Error;

    fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        self.0.write(addr, bytes)
    }
}

impl<I2C> embedded_hal_0_2::blocking::i2c::Read for I2cCompat<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    type Error = I2C::Error;

    fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.0.read(addr, buffer)
    }
}

impl<I2C> embedded_hal_0_2::blocking::i2c::WriteRead for I2cCompat<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    type Error = I2C::Error;

    fn write_read(&mut self, addr: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.0.write_read(addr, bytes, buffer)
    }
}
