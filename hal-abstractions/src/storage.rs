#![deny(unsafe_code)]
#![deny(warnings)]
//! Persistent storage ports
//!
//! Two very different kinds of memory survive a deep sleep:
//!
//! - **`ConfigStore`**: non-volatile (flash/EEPROM). Survives power loss,
//!   slow to write and wears out, so it only changes when settings change.
//! - **`RetainedMemory`**: battery-backed scratch RAM (RTC backup registers).
//!   Survives deep sleep but not power loss; cheap to write every cycle.
//!
//! Both are byte-oriented. Record layout, validity markers and checksums
//! belong to the caller.

use crate::PortError;

/// Port for the non-volatile settings block
pub trait ConfigStore {
    /// Error returned by the backend
    type Error: PortError;

    /// Size of the block in bytes
    fn capacity(&self) -> usize;

    /// Read `buf.len()` bytes from the start of the block
    ///
    /// A never-written block reads back as whatever the erased state of the
    /// medium is (0xFF for flash).
    fn read(&mut self, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Replace the block contents with `bytes`
    ///
    /// Implementations erase first if the medium needs it.
    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Port for battery-backed scratch memory that survives deep sleep
pub trait RetainedMemory {
    /// Size of the region in bytes
    fn capacity(&self) -> usize;

    /// Copy `buf.len()` bytes starting at `offset` into `buf`
    ///
    /// Reads past `capacity()` return zeroes.
    fn read(&self, offset: usize, buf: &mut [u8]);

    /// Copy `bytes` into the region starting at `offset`
    ///
    /// Writes past `capacity()` are dropped.
    fn write(&mut self, offset: usize, bytes: &[u8]);
}
