#![deny(unsafe_code)]
#![deny(warnings)]
//! Elapsed-time clock that survives deep sleep
//!
//! The board's uptime counter restarts from zero on every wake. Adding the
//! persisted `clock_offset` to it gives a continuous millisecond clock:
//!
//! ```text
//! now = clock_offset (retained) + uptime (since this wake)
//! ```
//!
//! Before sleeping the scheduler pushes `clock_offset` forward by the run
//! time so far plus the sleep duration, so `now()` picks up where it left
//! off. A health report rebases the clock (see [`ElapsedClock::rebase`]);
//! all retained timestamps are re-derived at that point, so decisions never
//! see the jump.

use core::ops::{Add, Sub};

use crate::state::PersistentCycleState;

/// Mandatory health report period (one hour)
pub const HEALTH_REPORT_PERIOD: Millis = Millis::from_secs(3600);

/// Milliseconds on the elapsed-time clock
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Millis(pub u64);

impl Millis {
    /// Start of the clock
    pub const ZERO: Self = Self(0);

    /// Whole seconds
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Raw millisecond count
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whole seconds, rounded down
    pub const fn whole_secs(self) -> u64 {
        self.0 / 1000
    }

    /// `self - earlier`, or zero if `earlier` is later
    pub const fn saturating_since(self, earlier: Millis) -> Millis {
        Self(self.0.saturating_sub(earlier.0))
    }
}

impl Add for Millis {
    type Output = Millis;

    fn add(self, rhs: Millis) -> Millis {
        Millis(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Millis {
    type Output = Millis;

    fn sub(self, rhs: Millis) -> Millis {
        self.saturating_since(rhs)
    }
}

/// Clock arithmetic over the retained cycle state
pub struct ElapsedClock;

impl ElapsedClock {
    /// Current elapsed time given this wake's uptime
    pub fn now(uptime: Millis, state: &PersistentCycleState) -> Millis {
        state.clock_offset + uptime
    }

    /// Restart the elapsed clock at this wake's uptime
    ///
    /// Called when a health report goes out; the caller must re-derive the
    /// health deadline immediately afterwards.
    pub fn rebase(state: &mut PersistentCycleState) {
        state.clock_offset = Millis::ZERO;
    }

    /// Reset an implausible health deadline to `now`
    ///
    /// A deadline more than one `period` in the future cannot have come from
    /// `now + period`, so retained memory must be corrupt. Pulling it in to
    /// `now` forces an early report instead of trusting a bogus value.
    /// Returns `true` if the deadline was reset.
    pub fn sanitize_deadline(state: &mut PersistentCycleState, now: Millis, period: Millis) -> bool {
        if state.next_health_report.saturating_since(now) > period {
            warn!(
                "Health report deadline {} ms is implausible at {} ms, resetting",
                state.next_health_report.as_u64(),
                now.as_u64()
            );
            state.next_health_report = now;
            true
        } else {
            false
        }
    }
}
