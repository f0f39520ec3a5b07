#![deny(unsafe_code)]
#![deny(warnings)]
//! Board port bundle
//!
//! One associated type per port keeps the firmware generic over a single
//! parameter instead of ten.
//!
//! # Example Implementation
//!
//! ```ignore
//! struct Feather;
//!
//! impl Platform for Feather {
//!     type Sensor = Vl53l0xSensor;
//!     type Radio = Rylr998<BufferedUart<'static>, MonoDelay>;
//!     type Display = Ssd1306Display;
//!     type Battery = VbatMonitor;
//!     type Store = FlashConfigStore;
//!     type Retained = BackupRegisters;
//!     type Console = BufferedUart<'static>;
//!     type Delay = MonoDelay;
//!     type Clock = MonoUptime;
//! }
//! ```

use embedded_hal_async::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};

use crate::{
    BatteryMonitor, ConfigStore, RadioTransport, RangeSensor, RetainedMemory, TextDisplay, Uptime,
};

/// The set of ports one board provides
pub trait Platform {
    /// Distance ranger
    type Sensor: RangeSensor;
    /// Long-range radio
    type Radio: RadioTransport;
    /// Optional text display
    type Display: TextDisplay;
    /// Supply-voltage ADC
    type Battery: BatteryMonitor;
    /// Non-volatile settings block
    type Store: ConfigStore;
    /// Battery-backed scratch memory
    type Retained: RetainedMemory;
    /// Serial configuration console, polled without blocking
    type Console: Read + ReadReady + Write;
    /// Async delay
    type Delay: DelayNs;
    /// Uptime since this wake
    type Clock: Uptime;
}
