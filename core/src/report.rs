#![deny(unsafe_code)]
#![deny(warnings)]
//! Report payload
//!
//! The receiving gateway expects one compact JSON object per frame:
//!
//! ```text
//! {"distance":123,"battery":3.41,"isPresent":true}
//! ```

use core::fmt::{self, Write};

use heapless::String;

use crate::sampler::Distance;

/// ADC count of a full cell
pub const FULL_BATTERY_COUNT: u16 = 3686;

/// Voltage of a full cell, in centivolts
pub const FULL_BATTERY_CENTIVOLTS: u16 = 412;

/// Room for the largest possible payload
pub const PAYLOAD_CAPACITY: usize = 64;

/// Encoded payload
pub type Payload = String<PAYLOAD_CAPACITY>;

/// Battery voltage in hundredths of a volt
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryVoltage(pub u16);

impl BatteryVoltage {
    /// Scale a raw ADC count linearly, `0..=FULL_BATTERY_COUNT` onto
    /// `0..=FULL_BATTERY_CENTIVOLTS`
    ///
    /// Counts above full extrapolate along the same line.
    pub fn from_raw(raw: u16) -> Self {
        let cv = u32::from(raw) * u32::from(FULL_BATTERY_CENTIVOLTS)
            / u32::from(FULL_BATTERY_COUNT);
        // u16::MAX * 412 / 3686 < u16::MAX
        Self(cv as u16)
    }

    pub const fn centivolts(self) -> u16 {
        self.0
    }
}

impl fmt::Display for BatteryVoltage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// One report
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReportPayload {
    pub distance: Distance,
    pub battery: BatteryVoltage,
    pub is_present: bool,
}

impl ReportPayload {
    /// Serialise to the wire format
    pub fn encode(&self) -> Result<Payload, fmt::Error> {
        let mut out = Payload::new();
        write!(
            out,
            "{{\"distance\":{},\"battery\":{},\"isPresent\":{}}}",
            self.distance.millimeters(),
            self.battery,
            self.is_present
        )?;
        Ok(out)
    }
}
