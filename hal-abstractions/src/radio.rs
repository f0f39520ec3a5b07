#![deny(unsafe_code)]
#![deny(warnings)]
//! Radio transport port
//!
//! The transport owns framing and addressing. Callers hand it a target
//! address and an opaque payload; how that reaches the air (AT commands
//! to a RYLR998, a raw SX127x driver, ...) is the implementor's business.

use crate::PortError;

/// Addressing and RF parameters for the long-range link
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkParams {
    /// Address reports are sent to (0 broadcasts)
    pub target_address: u16,
    /// This node's address
    pub address: u16,
    /// Network ID (3-15, or 18)
    pub network_id: u8,
    /// Carrier frequency in Hz
    pub band_hz: u32,
    /// Spreading factor (5-11)
    pub spreading_factor: u8,
    /// Bandwidth code: 7 = 125 kHz, 8 = 250 kHz, 9 = 500 kHz
    pub bandwidth: u8,
    /// Coding rate code: 1 = 4/5 ... 4 = 4/8
    pub coding_rate: u8,
    /// Programmed preamble length
    pub preamble: u8,
    /// UART baud rate between MCU and radio module
    pub baud_rate: u32,
    /// RF output power in dBm (0-22)
    pub power_dbm: u8,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            target_address: 1,
            address: 3,
            network_id: 18,
            band_hz: 915_000_000,
            spreading_factor: 8,
            bandwidth: 7,
            coding_rate: 1,
            preamble: 12,
            baud_rate: 115_200,
            power_dbm: 22,
        }
    }
}

/// Port for the long-range radio
#[allow(async_fn_in_trait)]
pub trait RadioTransport {
    /// Error returned by the transport
    type Error: PortError;

    /// Apply addressing and RF parameters to the module
    async fn configure(&mut self, params: &LinkParams) -> Result<(), Self::Error>;

    /// Send `payload` to `target`
    ///
    /// Returns once the module has accepted the frame for transmission.
    async fn send(&mut self, target: u16, payload: &[u8]) -> Result<(), Self::Error>;

    /// Signal strength of the last frame heard, if the transport tracks it
    fn last_rssi(&self) -> Option<i16> {
        None
    }
}
