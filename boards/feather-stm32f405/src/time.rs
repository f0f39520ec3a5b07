#![deny(unsafe_code)]
#![deny(warnings)]
//! Delay and uptime on the TIM2 monotonic
//!
//! TIM2 restarts from zero on every reset and standby wake, which is exactly
//! the "uptime since this wake" the elapsed clock expects.

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::Uptime;
use rtic_monotonics::stm32::prelude::*;

use crate::Mono;

/// Async delay backed by [`Mono`]
#[derive(Clone, Copy, Default)]
pub struct MonoDelay;

impl DelayNs for MonoDelay {
    async fn delay_ns(&mut self, ns: u32) {
        Mono::delay(u64::from(ns.div_ceil(1000)).micros()).await;
    }

    async fn delay_us(&mut self, us: u32) {
        Mono::delay(u64::from(us).micros()).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        Mono::delay(u64::from(ms).millis()).await;
    }
}

/// Milliseconds since this wake
#[derive(Clone, Copy, Default)]
pub struct MonoUptime;

impl Uptime for MonoUptime {
    fn uptime_ms(&self) -> u64 {
        Mono::now().duration_since_epoch().to_millis()
    }
}
