#![deny(unsafe_code)]
#![deny(warnings)]
//! Battery voltage through a 1:2 divider on A0 (PA4)

use embassy_stm32::adc::{Adc, AdcChannel, AnyAdcChannel, SampleTime};
use embassy_stm32::peripherals::{ADC1, PA4};
use embassy_stm32::Peri;
use hal_abstractions::BatteryMonitor;

pub struct VbatMonitor {
    adc: Adc<'static, ADC1>,
    channel: AnyAdcChannel<ADC1>,
}

impl VbatMonitor {
    pub fn new(adc: Peri<'static, ADC1>, pin: Peri<'static, PA4>) -> Self {
        let mut adc = Adc::new(adc);
        // The divider is high impedance
        adc.set_sample_time(SampleTime::CYCLES480);
        Self {
            adc,
            channel: pin.degrade_adc(),
        }
    }
}

impl BatteryMonitor for VbatMonitor {
    fn read_raw(&mut self) -> u16 {
        self.adc.blocking_read(&mut self.channel)
    }
}
