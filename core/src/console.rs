#![deny(unsafe_code)]
#![deny(warnings)]
//! Serial configuration console
//!
//! One command per line, `name=value`:
//!
//! ```text
//! sleeptime=300          set a value
//! loRaPower=NULL         back to the compiled-in default
//! factorydefaults=yes    reset everything and restart
//! ```
//!
//! Anything unparseable prints the settings listing.

use core::fmt::Write;

use hal_abstractions::LinkParams;
use heapless::{String, Vec};

use crate::config::Config;

/// Longest accepted command line
pub const LINE_CAPACITY: usize = 200;

/// A complete command line
pub type Line = String<LINE_CAPACITY>;

/// Assembles polled console bytes into lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    bytes: Vec<u8, LINE_CAPACITY>,
    overflowed: bool,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            overflowed: false,
        }
    }

    /// Feed one byte; returns the line when `byte` ends it
    ///
    /// A trailing `\r` is stripped. Overlong lines and lines that are not
    /// UTF-8 are dropped whole.
    pub fn push(&mut self, byte: u8) -> Option<Line> {
        if byte != b'\n' {
            if !self.overflowed && self.bytes.push(byte).is_err() {
                warn!("Console line longer than {} bytes, dropped", LINE_CAPACITY);
                self.overflowed = true;
            }
            return None;
        }

        let overflowed = core::mem::take(&mut self.overflowed);
        let mut bytes = core::mem::take(&mut self.bytes);
        if overflowed {
            return None;
        }
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }

        let text = core::str::from_utf8(&bytes).ok()?;
        let mut line = Line::new();
        line.push_str(text).ok()?;
        Some(line)
    }
}

/// A configurable setting, by console name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Setting {
    MinDistance,
    MaxDistance,
    SleepTime,
    Debug,
    DisplayEnabled,
    InvertDisplay,
    LoRaTargetAddress,
    LoRaAddress,
    LoRaBand,
    LoRaBandwidth,
    LoRaCodingRate,
    LoRaNetworkId,
    LoRaSpreadingFactor,
    LoRaPreamble,
    LoRaBaudRate,
    LoRaPower,
}

impl Setting {
    /// Every setting, in listing order
    pub const ALL: [Setting; 16] = [
        Self::MinDistance,
        Self::MaxDistance,
        Self::SleepTime,
        Self::Debug,
        Self::DisplayEnabled,
        Self::InvertDisplay,
        Self::LoRaTargetAddress,
        Self::LoRaAddress,
        Self::LoRaBand,
        Self::LoRaBandwidth,
        Self::LoRaCodingRate,
        Self::LoRaNetworkId,
        Self::LoRaSpreadingFactor,
        Self::LoRaPreamble,
        Self::LoRaBaudRate,
        Self::LoRaPower,
    ];

    /// Name used on the console
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MinDistance => "mindistance",
            Self::MaxDistance => "maxdistance",
            Self::SleepTime => "sleeptime",
            Self::Debug => "debug",
            Self::DisplayEnabled => "displayenabled",
            Self::InvertDisplay => "invertdisplay",
            Self::LoRaTargetAddress => "loRaTargetAddress",
            Self::LoRaAddress => "loRaAddress",
            Self::LoRaBand => "loRaBand",
            Self::LoRaBandwidth => "loRaBandwidth",
            Self::LoRaCodingRate => "loRaCodingRate",
            Self::LoRaNetworkId => "loRaNetworkID",
            Self::LoRaSpreadingFactor => "loRaSpreadingFactor",
            Self::LoRaPreamble => "loRaPreamble",
            Self::LoRaBaudRate => "loRaBaudRate",
            Self::LoRaPower => "loRaPower",
        }
    }

    /// Value hint for the settings listing
    const fn hint(&self) -> &'static str {
        match self {
            Self::MinDistance => "<minimum presence distance in mm>",
            Self::MaxDistance => "<maximum presence distance in mm>",
            Self::SleepTime => "<seconds to sleep between measurements>",
            Self::Debug | Self::DisplayEnabled | Self::InvertDisplay => "1|0",
            Self::LoRaTargetAddress => "<Target LoRa module's address 0-65535>",
            Self::LoRaAddress => "<LoRa module's address 0-65535>",
            Self::LoRaBand => "<Freq in Hz>",
            Self::LoRaBandwidth => "<bandwidth code 7-9>",
            Self::LoRaCodingRate => "<Coding rate code 1-4>",
            Self::LoRaNetworkId => "<Network ID 3-15 or 18>",
            Self::LoRaSpreadingFactor => "<Spreading Factor 5-11>",
            Self::LoRaPreamble => "<4-24, see docs>",
            Self::LoRaBaudRate => "<baud rate>",
            Self::LoRaPower => "<RF power in dbm>",
        }
    }

    /// Look up a setting by console name (case sensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    const fn is_link(&self) -> bool {
        matches!(
            self,
            Self::LoRaTargetAddress
                | Self::LoRaAddress
                | Self::LoRaBand
                | Self::LoRaBandwidth
                | Self::LoRaCodingRate
                | Self::LoRaNetworkId
                | Self::LoRaSpreadingFactor
                | Self::LoRaPreamble
                | Self::LoRaBaudRate
                | Self::LoRaPower
        )
    }
}

/// A parsed console command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Set one value; `None` restores its default
    Set { setting: Setting, value: Option<i64> },
    /// Reset every setting and restart
    FactoryDefaults,
}

/// A console line was rejected
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Not of the form `name=value`
    Malformed,
    /// No such setting
    UnknownSetting,
    /// Value is not a number (or not `yes` for `factorydefaults`)
    InvalidValue,
    /// Value does not fit the setting
    OutOfRange,
}

impl core::fmt::Display for CommandError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Malformed => write!(f, "Expected name=value"),
            Self::UnknownSetting => write!(f, "Unknown setting"),
            Self::InvalidValue => write!(f, "Invalid value"),
            Self::OutOfRange => write!(f, "Value out of range"),
        }
    }
}

impl core::error::Error for CommandError {}

/// Parse one console line
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let (name, value) = line.trim().split_once('=').ok_or(CommandError::Malformed)?;
    let (name, value) = (name.trim(), value.trim());
    if name.is_empty() || value.is_empty() {
        return Err(CommandError::Malformed);
    }

    if name == "factorydefaults" {
        return if value == "yes" {
            Ok(Command::FactoryDefaults)
        } else {
            Err(CommandError::InvalidValue)
        };
    }

    let setting = Setting::from_name(name).ok_or(CommandError::UnknownSetting)?;
    let value = if value == "NULL" {
        None
    } else {
        Some(value.parse::<i64>().map_err(|_| CommandError::InvalidValue)?)
    };
    Ok(Command::Set { setting, value })
}

/// Side effects a command needs beyond persisting the config
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Applied {
    /// A link parameter changed; the radio must be reconfigured
    pub radio_changed: bool,
    /// New display orientation, if it changed
    pub display_rotation: Option<bool>,
    /// The device must restart
    pub restart: bool,
}

fn narrow<T: TryFrom<i64>>(value: i64) -> Result<T, CommandError> {
    T::try_from(value).map_err(|_| CommandError::OutOfRange)
}

fn flag(value: i64) -> Result<bool, CommandError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(CommandError::OutOfRange),
    }
}

impl Config {
    /// Apply a command to this config
    ///
    /// Range checks beyond the field's type are left to [`Config::validate`];
    /// an out-of-range value is stored and drops the device into
    /// configuration-only mode on the next boot.
    pub fn apply(&mut self, command: &Command) -> Result<Applied, CommandError> {
        let (setting, value) = match *command {
            Command::FactoryDefaults => {
                *self = Config::default();
                return Ok(Applied {
                    radio_changed: true,
                    display_rotation: Some(self.invert_display),
                    restart: true,
                });
            }
            Command::Set { setting, value } => (setting, value),
        };

        let defaults = Config::default();
        let link = LinkParams::default();
        let before = *self;

        match setting {
            Setting::MinDistance => {
                self.min_distance_mm = value.map_or(Ok(defaults.min_distance_mm), narrow)?
            }
            Setting::MaxDistance => {
                self.max_distance_mm = value.map_or(Ok(defaults.max_distance_mm), narrow)?
            }
            Setting::SleepTime => {
                self.sleep_interval_secs =
                    value.map_or(Ok(defaults.sleep_interval_secs), narrow)?
            }
            Setting::Debug => self.debug = value.map_or(Ok(defaults.debug), flag)?,
            Setting::DisplayEnabled => {
                self.display_enabled = value.map_or(Ok(defaults.display_enabled), flag)?
            }
            Setting::InvertDisplay => {
                self.invert_display = value.map_or(Ok(defaults.invert_display), flag)?
            }
            Setting::LoRaTargetAddress => {
                self.link.target_address = value.map_or(Ok(link.target_address), narrow)?
            }
            Setting::LoRaAddress => {
                self.link.address = value.map_or(Ok(link.address), narrow)?
            }
            Setting::LoRaBand => self.link.band_hz = value.map_or(Ok(link.band_hz), narrow)?,
            Setting::LoRaBandwidth => {
                self.link.bandwidth = value.map_or(Ok(link.bandwidth), narrow)?
            }
            Setting::LoRaCodingRate => {
                self.link.coding_rate = value.map_or(Ok(link.coding_rate), narrow)?
            }
            Setting::LoRaNetworkId => {
                self.link.network_id = value.map_or(Ok(link.network_id), narrow)?
            }
            Setting::LoRaSpreadingFactor => {
                self.link.spreading_factor = value.map_or(Ok(link.spreading_factor), narrow)?
            }
            Setting::LoRaPreamble => {
                self.link.preamble = value.map_or(Ok(link.preamble), narrow)?
            }
            Setting::LoRaBaudRate => {
                self.link.baud_rate = value.map_or(Ok(link.baud_rate), narrow)?
            }
            Setting::LoRaPower => {
                self.link.power_dbm = value.map_or(Ok(link.power_dbm), narrow)?
            }
        }

        Ok(Applied {
            radio_changed: setting.is_link() && self.link != before.link,
            display_rotation: (self.invert_display != before.invert_display)
                .then_some(self.invert_display),
            restart: false,
        })
    }

    fn setting_value(&self, setting: Setting) -> i64 {
        match setting {
            Setting::MinDistance => i64::from(self.min_distance_mm),
            Setting::MaxDistance => i64::from(self.max_distance_mm),
            Setting::SleepTime => i64::from(self.sleep_interval_secs),
            Setting::Debug => i64::from(self.debug),
            Setting::DisplayEnabled => i64::from(self.display_enabled),
            Setting::InvertDisplay => i64::from(self.invert_display),
            Setting::LoRaTargetAddress => i64::from(self.link.target_address),
            Setting::LoRaAddress => i64::from(self.link.address),
            Setting::LoRaBand => i64::from(self.link.band_hz),
            Setting::LoRaBandwidth => i64::from(self.link.bandwidth),
            Setting::LoRaCodingRate => i64::from(self.link.coding_rate),
            Setting::LoRaNetworkId => i64::from(self.link.network_id),
            Setting::LoRaSpreadingFactor => i64::from(self.link.spreading_factor),
            Setting::LoRaPreamble => i64::from(self.link.preamble),
            Setting::LoRaBaudRate => i64::from(self.link.baud_rate),
            Setting::LoRaPower => i64::from(self.link.power_dbm),
        }
    }
}

/// Print the settings listing with current values
pub fn write_settings<W: Write>(config: &Config, valid: bool, out: &mut W) -> core::fmt::Result {
    for setting in Setting::ALL {
        writeln!(
            out,
            "{}={} ({})",
            setting.name(),
            setting.hint(),
            config.setting_value(setting)
        )?;
    }
    writeln!(out)?;
    writeln!(out, "*** Use NULL to reset a setting to its default value ***")?;
    writeln!(out, "*** Use \"factorydefaults=yes\" to reset all settings  ***")?;
    writeln!(out)?;
    writeln!(
        out,
        "Settings are {}",
        if valid { "complete." } else { "incomplete." }
    )
}
