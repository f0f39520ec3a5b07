#![deny(unsafe_code)]
#![deny(warnings)]
//! Standby and reset
//!
//! Deep sleep is STANDBY mode with the RTC wakeup timer armed. Everything
//! outside the backup domain is lost, so a wake looks like a reset with
//! `PWR_CSR.SBF` set, and the firmware resumes from the retained cycle
//! state.
//!
//! The wakeup timer runs from `ck_spre` (1 Hz off the LSE), so its 16-bit
//! reload covers up to 65536 s, far more than one health report period.

use cortex_m::peripheral::SCB;
use defmt::{info, warn};
use delivery_core::FirmwareError;
use embassy_stm32::pac;
use embassy_stm32::pac::pwr::vals::Pdds;
use embassy_stm32::pac::rtc::vals::Wucksel;

/// Longest sleep the wakeup timer can count
const MAX_WAKEUP_SECS: u32 = 0x1_0000;

/// Was this boot a wake from standby? Clears the flag.
pub fn woke_from_standby() -> bool {
    let woke = pac::PWR.csr1().read().sbf();
    pac::PWR.cr1().modify(|w| w.set_csbf(true));
    woke
}

/// Reset the MCU
pub fn restart(error: FirmwareError) -> ! {
    warn!("Restarting: {:?}", error);
    SCB::sys_reset()
}

/// Enter standby for `secs`; zero wakes immediately
pub fn standby(scb: &mut SCB, secs: u32) -> ! {
    if secs == 0 {
        info!("Zero-length sleep, resetting instead");
        SCB::sys_reset()
    }

    arm_wakeup(secs);

    pac::PWR.cr1().modify(|w| {
        w.set_cwuf(true);
        w.set_pdds(Pdds::STANDBY_MODE);
    });
    scb.set_sleepdeep();
    cortex_m::asm::dsb();
    loop {
        cortex_m::asm::wfi();
    }
}

fn arm_wakeup(secs: u32) {
    let reload = secs.clamp(1, MAX_WAKEUP_SECS) - 1;

    pac::PWR.cr1().modify(|w| w.set_dbp(true));
    pac::RTC.wpr().write(|w| w.set_key(0xCA));
    pac::RTC.wpr().write(|w| w.set_key(0x53));

    pac::RTC.cr().modify(|w| w.set_wute(false));
    while !pac::RTC.isr().read().wutwf() {}

    pac::RTC.wutr().write(|w| w.set_wut(reload as u16));
    pac::RTC.cr().modify(|w| {
        w.set_wucksel(Wucksel::CLOCKSPARE);
        w.set_wutie(true);
        w.set_wute(true);
    });
    pac::RTC.isr().modify(|w| w.set_wutf(false));

    pac::RTC.wpr().write(|w| w.set_key(0xFF));
}
