#![deny(unsafe_code)]
#![deny(warnings)]
//! Report policy
//!
//! Decides, once per wake, whether this cycle's measurement goes out over
//! the radio. The states are implicit in the retained latch pair crossed
//! with the previous and current presence verdicts:
//!
//! ```text
//! last  | this  | present  | absent   | report?
//! check | check | reported | reported |
//! ------+-------+----------+----------+------------------------------------
//! no    | no    | -        | false    | yes: absent_reported, !present_reported
//! no    | no    | -        | true     | no
//! no    | yes   | -        | -        | no (transition not yet confirmed)
//! yes   | no    | -        | -        | no (transition not yet confirmed)
//! yes   | yes   | false    | -        | yes: present_reported, !absent_reported
//! yes   | yes   | true     | -        | no
//! ```
//!
//! A health deadline in the past overrides the table and always reports.
//!
//! Requiring two identical verdicts in a row keeps a hand passing in front
//! of the sensor from producing a report; a real change has to persist for
//! one full sample interval.

use crate::clock::{ElapsedClock, Millis};
use crate::state::PersistentCycleState;

/// Why a report was triggered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trigger {
    /// The health report deadline has passed
    HealthDeadline,
    /// Two consecutive absent verdicts, not yet reported
    AbsentConfirmed,
    /// Two consecutive present verdicts, not yet reported
    PresentConfirmed,
}

impl Trigger {
    /// Short human-readable label
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HealthDeadline => "health",
            Self::AbsentConfirmed => "absent",
            Self::PresentConfirmed => "present",
        }
    }
}

/// The report state machine
#[derive(Clone, Copy, Debug)]
pub struct ReportPolicy {
    period: Millis,
}

impl Default for ReportPolicy {
    fn default() -> Self {
        Self::new(crate::clock::HEALTH_REPORT_PERIOD)
    }
}

impl ReportPolicy {
    /// Policy with the given health report period
    pub const fn new(period: Millis) -> Self {
        Self { period }
    }

    /// Health report period
    pub const fn period(&self) -> Millis {
        self.period
    }

    /// Should this cycle report?
    pub fn decide(
        &self,
        state: &PersistentCycleState,
        present: bool,
        now: Millis,
    ) -> Option<Trigger> {
        if now >= state.next_health_report {
            Some(Trigger::HealthDeadline)
        } else if !state.last_presence && !present && !state.absent_reported {
            Some(Trigger::AbsentConfirmed)
        } else if state.last_presence && present && !state.present_reported {
            Some(Trigger::PresentConfirmed)
        } else {
            None
        }
    }

    /// Record a report that went out
    ///
    /// Sets the latch matching `present`, clears the other, rebases the
    /// clock after a health report, and pushes the health deadline one
    /// period past now. Returns the (possibly rebased) current time.
    pub fn record_sent(
        &self,
        state: &mut PersistentCycleState,
        present: bool,
        trigger: Trigger,
        uptime: Millis,
    ) -> Millis {
        state.present_reported = present;
        state.absent_reported = !present;

        if trigger == Trigger::HealthDeadline {
            ElapsedClock::rebase(state);
        }
        let now = ElapsedClock::now(uptime, state);
        state.next_health_report = now + self.period;
        now
    }

    /// Close out the cycle; runs whether or not anything was sent
    pub fn finish_cycle(&self, state: &mut PersistentCycleState, present: bool) {
        state.last_presence = present;
    }

    /// Push the health deadline one period past now without touching the
    /// latches or the clock
    pub fn defer_health(&self, state: &mut PersistentCycleState, uptime: Millis) {
        state.next_health_report = ElapsedClock::now(uptime, state) + self.period;
    }

    /// Apply the outcome of this cycle's report attempt
    ///
    /// A failed send leaves the latches alone so a presence change fires
    /// again next cycle. A failed health report still moves the deadline
    /// one period on.
    pub fn commit(
        &self,
        state: &mut PersistentCycleState,
        present: bool,
        uptime: Millis,
        trigger: Option<Trigger>,
        sent: bool,
    ) {
        match (trigger, sent) {
            (Some(trigger), true) => {
                self.record_sent(state, present, trigger, uptime);
            }
            (Some(Trigger::HealthDeadline), false) => self.defer_health(state, uptime),
            _ => {}
        }
        self.finish_cycle(state, present);
    }
}
