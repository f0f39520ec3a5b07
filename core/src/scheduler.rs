#![deny(unsafe_code)]
#![deny(warnings)]
//! Sleep scheduler
//!
//! Picks the sleep length so the device wakes no later than the next sample
//! and no later than the next mandatory health report.

use crate::clock::Millis;
use crate::state::PersistentCycleState;

/// Pause between iterations when sleeping is disabled
pub const CONTINUOUS_PAUSE_MS: u32 = 1000;

/// Time the radio needs to get a frame on air before its supply goes away
pub const PUBLISH_SETTLE_MS: u32 = 400;

/// What to do at the end of a cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepPlan {
    /// `sleep_interval == 0`: stay awake and loop
    Continuous,
    /// Deep sleep for `secs` seconds (may be zero when a deadline is due)
    Sleep { secs: u32 },
}

impl SleepPlan {
    /// Seconds of deep sleep; zero for continuous mode
    pub const fn secs(&self) -> u32 {
        match self {
            Self::Continuous => 0,
            Self::Sleep { secs } => *secs,
        }
    }
}

/// `min(sleep_interval, whole seconds until deadline)`
pub fn plan(sleep_interval_secs: u32, deadline: Millis, now: Millis) -> SleepPlan {
    if sleep_interval_secs == 0 {
        return SleepPlan::Continuous;
    }

    let until_deadline = deadline.saturating_since(now).whole_secs();
    let secs = u32::try_from(until_deadline)
        .unwrap_or(u32::MAX)
        .min(sleep_interval_secs);
    SleepPlan::Sleep { secs }
}

/// Move the clock offset past the coming sleep
///
/// On wake the uptime counter restarts from zero, so `now()` resumes at
/// `now + secs`.
pub fn advance_for_sleep(state: &mut PersistentCycleState, now: Millis, secs: u32) {
    state.clock_offset = now + Millis::from_secs(u64::from(secs));
}
