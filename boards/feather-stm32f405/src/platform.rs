#![deny(unsafe_code)]
#![deny(warnings)]
//! Port bundle for the Feather STM32F405

use delivery_core::radio::Rylr998;
use embassy_stm32::usart::BufferedUart;
use hal_abstractions::Platform;

use crate::battery::VbatMonitor;
use crate::display::OledDisplay;
use crate::retained::BackupRegisters;
use crate::sensor::Vl53l0xSensor;
use crate::storage::FlashConfigStore;
use crate::time::{MonoDelay, MonoUptime};

pub struct Feather;

impl Platform for Feather {
    type Sensor = Vl53l0xSensor;
    type Radio = Rylr998<BufferedUart<'static>, MonoDelay>;
    type Display = OledDisplay;
    type Battery = VbatMonitor;
    type Store = FlashConfigStore;
    type Retained = BackupRegisters;
    type Console = BufferedUart<'static>;
    type Delay = MonoDelay;
    type Clock = MonoUptime;
}
