#![deny(unsafe_code)]
#![deny(warnings)]
//! RTC backup registers as retained memory
//!
//! The 20 backup registers (80 bytes) sit in the backup domain and keep
//! their contents through standby and system reset for as long as VBAT is
//! powered. Bytes are packed little-endian into the 32-bit registers.

use embassy_stm32::rtc::Rtc;
use hal_abstractions::RetainedMemory;

/// Backup registers on the STM32F405
const REGISTER_COUNT: usize = 20;

const WORD: usize = 4;

pub struct BackupRegisters {
    rtc: Rtc,
}

impl BackupRegisters {
    pub fn new(rtc: Rtc) -> Self {
        Self { rtc }
    }

    fn word(&self, index: usize) -> [u8; WORD] {
        self.rtc
            .read_backup_register(index)
            .unwrap_or(0)
            .to_le_bytes()
    }
}

impl RetainedMemory for BackupRegisters {
    fn capacity(&self) -> usize {
        REGISTER_COUNT * WORD
    }

    fn read(&self, offset: usize, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            let at = offset + i;
            *byte = if at < self.capacity() {
                self.word(at / WORD)[at % WORD]
            } else {
                0
            };
        }
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) {
        let end = (offset + bytes.len()).min(self.capacity());
        let mut at = offset;
        while at < end {
            let index = at / WORD;
            let word_end = ((index + 1) * WORD).min(end);
            let mut word = self.word(index);
            for pos in at..word_end {
                word[pos % WORD] = bytes[pos - offset];
            }
            self.rtc
                .write_backup_register(index, u32::from_le_bytes(word));
            at = word_end;
        }
    }
}
