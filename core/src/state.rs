#![deny(unsafe_code)]
#![deny(warnings)]
//! Cycle state retained across deep sleep
//!
//! Battery-backed memory keeps a handful of bytes alive while the MCU is
//! powered down. Everything the report policy needs from the previous cycle
//! lives here; everything else is recomputed on wake.
//!
//! # Record layout
//!
//! ```text
//! offset  size  field
//!      0     2  magic (0xC5D1, LE)
//!      2     1  format version
//!      3     1  sequence number (wrapping)
//!      4     1  flags: bit0 last_presence, bit1 present_reported, bit2 absent_reported
//!      5     1  reserved (0)
//!      6     2  last RSSI (i16, LE)
//!      8     8  next health report deadline (ms, LE)
//!     16     8  clock offset (ms, LE)
//!     24     2  CRC-16/IBM-3740 over bytes 0..24
//! ```
//!
//! # Torn writes
//!
//! Two slots (A/B) are kept. A save always goes to the slot that does NOT
//! hold the newest record, so losing power mid-write leaves the previous
//! record intact; the half-written slot fails its CRC and is ignored on the
//! next load.

use crc::{Crc, CRC_16_IBM_3740};
use hal_abstractions::RetainedMemory;

use crate::clock::Millis;

const RECORD_MAGIC: u16 = 0xC5D1;
const RECORD_VERSION: u8 = 1;

/// Encoded record size in bytes
pub const RECORD_LEN: usize = 26;

/// Distance between slot starts (word aligned for backup registers)
pub const SLOT_STRIDE: usize = 28;

/// Retained memory needed for both slots
pub const REQUIRED_CAPACITY: usize = 2 * SLOT_STRIDE;

const FLAG_LAST_PRESENCE: u8 = 1 << 0;
const FLAG_PRESENT_REPORTED: u8 = 1 << 1;
const FLAG_ABSENT_REPORTED: u8 = 1 << 2;

/// RSSI placeholder before anything has been heard
pub const UNKNOWN_RSSI: i16 = -99;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Decision state carried from one wake cycle to the next
///
/// Wiped on power loss; a wiped state has a zero health deadline and so
/// forces a report on the first cycle after a cold boot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PersistentCycleState {
    /// Elapsed time at which a report is due regardless of presence
    pub next_health_report: Millis,
    /// Elapsed time accumulated over previous wakes
    pub clock_offset: Millis,
    /// Presence verdict of the previous cycle
    pub last_presence: bool,
    /// A "present" report has gone out since the last "absent" one
    pub present_reported: bool,
    /// An "absent" report has gone out since the last "present" one
    pub absent_reported: bool,
    /// Diagnostic only
    pub last_rssi: i16,
}

impl Default for PersistentCycleState {
    fn default() -> Self {
        Self {
            next_health_report: Millis::ZERO,
            clock_offset: Millis::ZERO,
            last_presence: false,
            present_reported: false,
            absent_reported: false,
            last_rssi: UNKNOWN_RSSI,
        }
    }
}

impl PersistentCycleState {
    /// At most one latch is set
    pub const fn latches_consistent(&self) -> bool {
        !(self.present_reported && self.absent_reported)
    }

    /// Encode with the given sequence number
    pub fn encode(&self, sequence: u8) -> [u8; RECORD_LEN] {
        let mut flags = 0;
        if self.last_presence {
            flags |= FLAG_LAST_PRESENCE;
        }
        if self.present_reported {
            flags |= FLAG_PRESENT_REPORTED;
        }
        if self.absent_reported {
            flags |= FLAG_ABSENT_REPORTED;
        }

        let mut out = [0u8; RECORD_LEN];
        out[0..2].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        out[2] = RECORD_VERSION;
        out[3] = sequence;
        out[4] = flags;
        out[6..8].copy_from_slice(&self.last_rssi.to_le_bytes());
        out[8..16].copy_from_slice(&self.next_health_report.as_u64().to_le_bytes());
        out[16..24].copy_from_slice(&self.clock_offset.as_u64().to_le_bytes());
        let crc = CRC16.checksum(&out[..24]);
        out[24..26].copy_from_slice(&crc.to_le_bytes());
        out
    }

    /// Decode a record, returning the state and its sequence number
    pub fn decode(bytes: &[u8]) -> Result<(Self, u8), StateError> {
        let bytes = bytes.get(..RECORD_LEN).ok_or(StateError::Truncated)?;

        if u16::from_le_bytes([bytes[0], bytes[1]]) != RECORD_MAGIC {
            return Err(StateError::BadMagic);
        }
        let stored_crc = u16::from_le_bytes([bytes[24], bytes[25]]);
        if CRC16.checksum(&bytes[..24]) != stored_crc {
            return Err(StateError::Checksum);
        }
        if bytes[2] != RECORD_VERSION {
            return Err(StateError::UnsupportedVersion(bytes[2]));
        }

        let flags = bytes[4];
        let state = Self {
            next_health_report: Millis(read_u64(&bytes[8..16])),
            clock_offset: Millis(read_u64(&bytes[16..24])),
            last_presence: flags & FLAG_LAST_PRESENCE != 0,
            present_reported: flags & FLAG_PRESENT_REPORTED != 0,
            absent_reported: flags & FLAG_ABSENT_REPORTED != 0,
            last_rssi: i16::from_le_bytes([bytes[6], bytes[7]]),
        };
        if !state.latches_consistent() {
            return Err(StateError::LatchConflict);
        }
        Ok((state, bytes[3]))
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    u64::from_le_bytes(raw)
}

/// Retained state errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StateError {
    /// Fewer than `RECORD_LEN` bytes
    Truncated,
    /// Slot never written (or wiped by power loss)
    BadMagic,
    /// Slot torn or corrupted
    Checksum,
    /// Written by an incompatible firmware
    UnsupportedVersion(u8),
    /// Both report latches set
    LatchConflict,
    /// Retained region too small for two slots
    CapacityTooSmall { available: usize },
    /// Read-back after write did not match
    VerifyFailed,
}

impl core::fmt::Display for StateError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Truncated => write!(f, "Retained record truncated"),
            Self::BadMagic => write!(f, "Retained record not present"),
            Self::Checksum => write!(f, "Retained record checksum mismatch"),
            Self::UnsupportedVersion(v) => write!(f, "Unsupported retained record version {}", v),
            Self::LatchConflict => write!(f, "Both report latches set"),
            Self::CapacityTooSmall { available } => write!(
                f,
                "Retained memory too small: {} bytes, need {}",
                available, REQUIRED_CAPACITY
            ),
            Self::VerifyFailed => write!(f, "Retained record verify failed"),
        }
    }
}

impl core::error::Error for StateError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    A,
    B,
}

impl Slot {
    const fn offset(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => SLOT_STRIDE,
        }
    }

    const fn other(self) -> Self {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

/// `a` was written after `b` (wrapping sequence comparison)
const fn is_newer(a: u8, b: u8) -> bool {
    (a.wrapping_sub(b) as i8) > 0
}

/// Double-buffered cycle state in battery-backed memory
pub struct RetainedStore<M: RetainedMemory> {
    memory: M,
    newest: Option<(Slot, u8)>,
}

impl<M: RetainedMemory> RetainedStore<M> {
    /// Wrap a retained region; it must hold two slots
    pub fn new(memory: M) -> Result<Self, StateError> {
        let available = memory.capacity();
        if available < REQUIRED_CAPACITY {
            return Err(StateError::CapacityTooSmall { available });
        }
        Ok(Self {
            memory,
            newest: None,
        })
    }

    fn read_slot(&self, slot: Slot) -> Result<(PersistentCycleState, u8), StateError> {
        let mut buf = [0u8; RECORD_LEN];
        self.memory.read(slot.offset(), &mut buf);
        PersistentCycleState::decode(&buf)
    }

    /// Load the newest valid record, or the cold-boot default
    pub fn load(&mut self) -> PersistentCycleState {
        let a = self.read_slot(Slot::A);
        let b = self.read_slot(Slot::B);

        let picked = match (a, b) {
            (Ok((sa, qa)), Ok((sb, qb))) => {
                if is_newer(qb, qa) {
                    Some((Slot::B, sb, qb))
                } else {
                    Some((Slot::A, sa, qa))
                }
            }
            (Ok((sa, qa)), Err(e)) => {
                debug!("Retained slot B unusable: {:?}", e);
                Some((Slot::A, sa, qa))
            }
            (Err(e), Ok((sb, qb))) => {
                debug!("Retained slot A unusable: {:?}", e);
                Some((Slot::B, sb, qb))
            }
            (Err(_), Err(_)) => None,
        };

        match picked {
            Some((slot, state, sequence)) => {
                self.newest = Some((slot, sequence));
                state
            }
            None => {
                info!("No retained cycle state, starting cold");
                self.newest = None;
                PersistentCycleState::default()
            }
        }
    }

    /// Persist `state` into the older slot and verify it
    pub fn save(&mut self, state: &PersistentCycleState) -> Result<(), StateError> {
        let (slot, sequence) = match self.newest {
            Some((slot, sequence)) => (slot.other(), sequence.wrapping_add(1)),
            None => (Slot::A, 0),
        };

        let record = state.encode(sequence);
        self.memory.write(slot.offset(), &record);

        let mut check = [0u8; RECORD_LEN];
        self.memory.read(slot.offset(), &mut check);
        if check != record {
            return Err(StateError::VerifyFailed);
        }

        self.newest = Some((slot, sequence));
        Ok(())
    }

    /// Release the underlying memory
    pub fn into_inner(self) -> M {
        self.memory
    }
}
