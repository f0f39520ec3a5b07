//! Platform-agnostic core logic for the delivery reporter firmware
//!
//! This crate contains the duty-cycle and report-decision logic that decides,
//! across deep-sleep boundaries, when to measure, when to report and how long
//! to sleep. It has NO hardware dependencies; boards plug in through the
//! traits in `hal-abstractions`.
//!
//! # Architecture
//!
//! ```text
//!  sampler ──► policy ──► (radio report) ──► scheduler ──► deep sleep
//!     │           │                              │
//!     │        state (retained, double-buffered) ◄┘
//!     │           │
//!   clock ◄───────┘  (uptime + persisted offset)
//! ```
//!
//! - **`clock`**: elapsed-time clock that survives sleep
//! - **`sampler`**: burst of range readings reduced to their mode
//! - **`policy`**: report state machine over the persisted latches
//! - **`scheduler`**: sleep duration and pre-sleep clock advance
//! - **`state`**: battery-backed cycle state with checksummed A/B slots
//! - **`config`**: runtime settings persisted in the config store
//! - **`console`**: serial `name=value` configuration commands
//! - **`report`**: report payload wire format
//! - **`radio`**: RYLR998 AT-command transport
//! - **`firmware`**: the cycle runner wiring all of the above to a `Platform`

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]
#![deny(warnings)]

#[macro_use]
mod fmt;

pub mod clock;
pub mod config;
pub mod console;
pub mod firmware;
pub mod policy;
pub mod radio;
pub mod report;
pub mod sampler;
pub mod scheduler;
pub mod state;

#[cfg(test)]
mod mock;

pub use clock::{ElapsedClock, Millis, HEALTH_REPORT_PERIOD};
pub use config::{Config, ConfigError, LoadedConfig};
pub use firmware::{CycleOutcome, Devices, Firmware, FirmwareError, Mode, RestartReason, Step};
pub use policy::{ReportPolicy, Trigger};
pub use report::{BatteryVoltage, ReportPayload};
pub use sampler::Distance;
pub use scheduler::SleepPlan;
pub use state::{PersistentCycleState, RetainedStore, StateError};
