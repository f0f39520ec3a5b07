#![deny(unsafe_code)]
#![deny(warnings)]
//! Settings block in internal flash
//!
//! The record lives at the start of sector 11, the last 128 KB sector of
//! the STM32F405RG. The firmware image never reaches that far.

use defmt::{debug, Format};
use delivery_core::config::CONFIG_RECORD_LEN;
use embassy_stm32::flash::{Blocking, Flash};
use hal_abstractions::ConfigStore;

/// Offset of sector 11 from the start of flash
const SETTINGS_SECTOR_OFFSET: u32 = 0x000E_0000;

/// Size of sector 11
const SETTINGS_SECTOR_SIZE: u32 = 0x0002_0000;

/// Flash errors
#[derive(Debug, Clone, Copy, Format)]
pub enum StorageError {
    /// Sector erase failed
    EraseFailed,
    /// Program or read failed
    HardwareError,
}

pub struct FlashConfigStore {
    flash: Flash<'static, Blocking>,
}

impl FlashConfigStore {
    pub fn new(flash: Flash<'static, Blocking>) -> Self {
        Self { flash }
    }
}

impl ConfigStore for FlashConfigStore {
    type Error = StorageError;

    fn capacity(&self) -> usize {
        CONFIG_RECORD_LEN
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), StorageError> {
        self.flash
            .blocking_read(SETTINGS_SECTOR_OFFSET, buf)
            .map_err(|_| StorageError::HardwareError)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        debug!("Erasing settings sector");
        self.flash
            .blocking_erase(
                SETTINGS_SECTOR_OFFSET,
                SETTINGS_SECTOR_OFFSET + SETTINGS_SECTOR_SIZE,
            )
            .map_err(|_| StorageError::EraseFailed)?;
        self.flash
            .blocking_write(SETTINGS_SECTOR_OFFSET, bytes)
            .map_err(|_| StorageError::HardwareError)
    }
}
