//! Hardware abstraction traits for the delivery reporter firmware
//!
//! This crate defines traits that abstract over hardware differences
//! between boards. BSPs implement these traits; `delivery-core` drives
//! them without knowing which ranger, radio or memory sits behind them.
//!
//! - **`sensor`**: distance ranger and battery monitor
//! - **`radio`**: long-range radio transport and its link parameters
//! - **`display`**: optional text display / indicator
//! - **`storage`**: non-volatile config store and battery-backed scratch memory
//! - **`time`**: free-running uptime counter (restarts on every wake)
//! - **`platform`**: associated-type bundle tying one board's ports together

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]
#![deny(warnings)]

pub mod display;
pub mod platform;
pub mod radio;
pub mod sensor;
pub mod storage;
pub mod time;

pub use display::TextDisplay;
pub use platform::Platform;
pub use radio::{LinkParams, RadioTransport};
pub use sensor::{BatteryMonitor, RangeSensor};
pub use storage::{ConfigStore, RetainedMemory};
pub use time::Uptime;

/// Error bound shared by every port's associated error type
#[cfg(feature = "defmt")]
pub trait PortError: core::fmt::Debug + defmt::Format {}
#[cfg(feature = "defmt")]
impl<T: core::fmt::Debug + defmt::Format> PortError for T {}

/// Error bound shared by every port's associated error type
#[cfg(not(feature = "defmt"))]
pub trait PortError: core::fmt::Debug {}
#[cfg(not(feature = "defmt"))]
impl<T: core::fmt::Debug> PortError for T {}
