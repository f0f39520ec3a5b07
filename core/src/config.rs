#![deny(unsafe_code)]
#![deny(warnings)]
//! Runtime configuration
//!
//! Settings live in the non-volatile [`ConfigStore`] and survive power loss.
//! They change only through console commands; each change is written back
//! immediately.
//!
//! # Record layout
//!
//! ```text
//! offset   size  field
//!      0      2  VALID_SETTINGS_FLAG (0xDAB0, LE)
//!      2      2  payload length n (LE)
//!      4      n  postcard-encoded Config
//!    4+n      2  CRC-16/IBM-3740 over bytes 0..4+n
//!    6+n      -  0xFF padding up to CONFIG_RECORD_LEN
//! ```
//!
//! A block without the marker, with a bad CRC or with a payload postcard
//! cannot decode has never been (completely) configured and reads back as
//! [`LoadedConfig::Blank`].

use crc::{Crc, CRC_16_IBM_3740};
use hal_abstractions::{ConfigStore, LinkParams};
use serde::{Deserialize, Serialize};

use crate::sampler::Distance;

/// Marks a block written by [`save`]
pub const VALID_SETTINGS_FLAG: u16 = 0xDAB0;

/// Bytes reserved for the settings record
pub const CONFIG_RECORD_LEN: usize = 64;

const HEADER_LEN: usize = 4;
const CRC_LEN: usize = 2;
const MAX_PAYLOAD: usize = CONFIG_RECORD_LEN - HEADER_LEN - CRC_LEN;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Device settings
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Presence lower bound, exclusive (mm)
    pub min_distance_mm: i32,
    /// Presence upper bound, exclusive (mm)
    pub max_distance_mm: i32,
    /// Seconds between samples; 0 keeps the device awake and sampling
    pub sleep_interval_secs: u32,
    /// Verbose diagnostics on the console
    pub debug: bool,
    /// Drive the display
    pub display_enabled: bool,
    /// Rotate the display 180 degrees
    pub invert_display: bool,
    /// Radio addressing and RF parameters
    pub link: LinkParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_distance_mm: 0,
            max_distance_mm: 400,
            sleep_interval_secs: 0,
            debug: false,
            display_enabled: true,
            invert_display: false,
            link: LinkParams::default(),
        }
    }
}

impl Config {
    /// Presence verdict for a measured distance
    pub fn is_present(&self, distance: Distance) -> bool {
        let mm = distance.millimeters();
        self.min_distance_mm < mm && mm < self.max_distance_mm
    }

    /// Check every setting is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_distance_mm <= 0 || self.min_distance_mm >= self.max_distance_mm {
            return Err(ConfigError::DistanceRange {
                min: self.min_distance_mm,
                max: self.max_distance_mm,
            });
        }

        let link = &self.link;
        if !(5..=11).contains(&link.spreading_factor) {
            return Err(ConfigError::SpreadingFactor(link.spreading_factor));
        }
        if !(7..=9).contains(&link.bandwidth) {
            return Err(ConfigError::Bandwidth(link.bandwidth));
        }
        if !(1..=4).contains(&link.coding_rate) {
            return Err(ConfigError::CodingRate(link.coding_rate));
        }
        if !((3..=15).contains(&link.network_id) || link.network_id == 18) {
            return Err(ConfigError::NetworkId(link.network_id));
        }
        if link.power_dbm > 22 {
            return Err(ConfigError::Power(link.power_dbm));
        }
        // Only network 18 may program a non-default preamble
        let preamble_ok = if link.network_id == 18 {
            (4..=24).contains(&link.preamble)
        } else {
            link.preamble == 12
        };
        if !preamble_ok {
            return Err(ConfigError::Preamble(link.preamble));
        }
        Ok(())
    }
}

/// A setting is out of range
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Need `0 < max` and `min < max`
    DistanceRange { min: i32, max: i32 },
    /// Spreading factor outside 5-11
    SpreadingFactor(u8),
    /// Bandwidth code outside 7-9
    Bandwidth(u8),
    /// Coding rate code outside 1-4
    CodingRate(u8),
    /// Network ID not 3-15 or 18
    NetworkId(u8),
    /// RF power above 22 dBm
    Power(u8),
    /// Preamble not valid for the network ID
    Preamble(u8),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DistanceRange { min, max } => {
                write!(f, "Distance range {}..{} is empty", min, max)
            }
            Self::SpreadingFactor(v) => write!(f, "Spreading factor {} not in 5-11", v),
            Self::Bandwidth(v) => write!(f, "Bandwidth code {} not in 7-9", v),
            Self::CodingRate(v) => write!(f, "Coding rate code {} not in 1-4", v),
            Self::NetworkId(v) => write!(f, "Network ID {} not in 3-15 or 18", v),
            Self::Power(v) => write!(f, "RF power {} dBm above 22", v),
            Self::Preamble(v) => write!(f, "Preamble {} not valid for network ID", v),
        }
    }
}

impl core::error::Error for ConfigError {}

/// The settings block could not be read or written
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigStoreError {
    /// Storage backend failed
    Backend,
    /// Block is smaller than a record
    TooSmall { capacity: usize },
    /// Config does not fit in a record
    Encode,
}

impl core::fmt::Display for ConfigStoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Backend => write!(f, "Config storage error"),
            Self::TooSmall { capacity } => write!(
                f,
                "Config block of {} bytes, need {}",
                capacity, CONFIG_RECORD_LEN
            ),
            Self::Encode => write!(f, "Config does not fit in record"),
        }
    }
}

impl core::error::Error for ConfigStoreError {}

/// What the settings block held at boot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoadedConfig {
    /// Complete and usable
    Valid(Config),
    /// Written, but a setting is out of range
    Invalid(Config, ConfigError),
    /// Never configured
    Blank,
}

/// Read the settings record
pub fn load<S: ConfigStore>(store: &mut S) -> Result<LoadedConfig, ConfigStoreError> {
    check_capacity(store)?;

    let mut block = [0u8; CONFIG_RECORD_LEN];
    store.read(&mut block).map_err(|e| {
        error!("Config read failed: {:?}", e);
        ConfigStoreError::Backend
    })?;

    let marker = u16::from_le_bytes([block[0], block[1]]);
    if marker != VALID_SETTINGS_FLAG {
        info!("Settings block not configured");
        return Ok(LoadedConfig::Blank);
    }

    let len = usize::from(u16::from_le_bytes([block[2], block[3]]));
    if len > MAX_PAYLOAD {
        warn!("Settings payload length {} too large", len);
        return Ok(LoadedConfig::Blank);
    }

    let end = HEADER_LEN + len;
    let stored_crc = u16::from_le_bytes([block[end], block[end + 1]]);
    if CRC16.checksum(&block[..end]) != stored_crc {
        warn!("Settings checksum mismatch");
        return Ok(LoadedConfig::Blank);
    }

    let config: Config = match postcard::from_bytes(&block[HEADER_LEN..end]) {
        Ok(config) => config,
        Err(_) => {
            warn!("Settings payload does not decode");
            return Ok(LoadedConfig::Blank);
        }
    };

    Ok(match config.validate() {
        Ok(()) => LoadedConfig::Valid(config),
        Err(e) => LoadedConfig::Invalid(config, e),
    })
}

/// Write the settings record
pub fn save<S: ConfigStore>(store: &mut S, config: &Config) -> Result<(), ConfigStoreError> {
    check_capacity(store)?;

    let mut block = [0xFFu8; CONFIG_RECORD_LEN];
    let len = postcard::to_slice(config, &mut block[HEADER_LEN..HEADER_LEN + MAX_PAYLOAD])
        .map_err(|_| ConfigStoreError::Encode)?
        .len();

    block[0..2].copy_from_slice(&VALID_SETTINGS_FLAG.to_le_bytes());
    // MAX_PAYLOAD bounds len well below u16::MAX
    block[2..4].copy_from_slice(&(len as u16).to_le_bytes());
    let end = HEADER_LEN + len;
    let crc = CRC16.checksum(&block[..end]);
    block[end..end + CRC_LEN].copy_from_slice(&crc.to_le_bytes());

    store.write(&block).map_err(|e| {
        error!("Config write failed: {:?}", e);
        ConfigStoreError::Backend
    })
}

fn check_capacity<S: ConfigStore>(store: &S) -> Result<(), ConfigStoreError> {
    let capacity = store.capacity();
    if capacity < CONFIG_RECORD_LEN {
        return Err(ConfigStoreError::TooSmall { capacity });
    }
    Ok(())
}
