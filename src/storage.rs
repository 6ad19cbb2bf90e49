//! Settings record on a raw flash region.
//!
//! The record lives at the start of a dedicated erase sector. Saving erases
//! the whole sector, writes the record and reads it back.

use crate::config::{Settings, SettingsError, SETTINGS_LEN};
use crate::ports::SettingsStore;

/// Minimal flash operations needed to keep one record.
pub trait SectorFlash {
    type Error;

    /// Erases the sector starting at `address`. Erased bytes read as 0xFF.
    fn erase_sector(&mut self, address: u32) -> Result<(), Self::Error>;

    fn read(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Writes into erased flash. `address` is word aligned.
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Self::Error>;
}

pub struct FlashSettingsStore<F> {
    flash: F,
    address: u32,
}

impl<F: SectorFlash> FlashSettingsStore<F> {
    pub fn new(flash: F, address: u32) -> Self {
        Self { flash, address }
    }

    pub fn release(self) -> F {
        self.flash
    }
}

impl<F: SectorFlash> SettingsStore for FlashSettingsStore<F> {
    fn load(&mut self) -> Result<Settings, SettingsError> {
        let mut record = [0u8; SETTINGS_LEN];
        self.flash
            .read(self.address, &mut record)
            .map_err(|_| SettingsError::Storage)?;
        Settings::from_bytes(&record)
    }

    fn save(&mut self, settings: &Settings) -> Result<(), SettingsError> {
        let record = settings.to_bytes();
        if self.flash.erase_sector(self.address).is_err() {
            log_error!("settings sector erase failed");
            return Err(SettingsError::Storage);
        }
        if self.flash.write(self.address, &record).is_err() {
            log_error!("settings flash write failed");
            return Err(SettingsError::Storage);
        }

        let mut readback = [0u8; SETTINGS_LEN];
        self.flash
            .read(self.address, &mut readback)
            .map_err(|_| SettingsError::Storage)?;
        if readback != record {
            log_error!("settings readback mismatch");
            return Err(SettingsError::Storage);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_settings, Region};

    const BASE: u32 = 0x000E_0000;

    /// NOR semantics: erase sets 0xFF, writes can only clear bits.
    struct RamFlash {
        cells: Vec<u8>,
        erases: usize,
        fail_writes: bool,
    }

    impl RamFlash {
        fn blank() -> Self {
            Self {
                cells: vec![0xFF; 64],
                erases: 0,
                fail_writes: false,
            }
        }
    }

    impl SectorFlash for RamFlash {
        type Error = ();

        fn erase_sector(&mut self, _address: u32) -> Result<(), ()> {
            self.erases += 1;
            self.cells.fill(0xFF);
            Ok(())
        }

        fn read(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), ()> {
            let at = (address - BASE) as usize;
            buffer.copy_from_slice(&self.cells[at..at + buffer.len()]);
            Ok(())
        }

        fn write(&mut self, address: u32, data: &[u8]) -> Result<(), ()> {
            if self.fail_writes {
                return Err(());
            }
            let at = (address - BASE) as usize;
            for (cell, &b) in self.cells[at..].iter_mut().zip(data) {
                *cell &= b;
            }
            Ok(())
        }
    }

    #[test]
    fn blank_sector_reads_as_no_record() {
        let mut store = FlashSettingsStore::new(RamFlash::blank(), BASE);
        assert_eq!(store.load(), Err(SettingsError::BadMagic));
        assert_eq!(load_settings(&mut store), Settings::default());
    }

    #[test]
    fn save_then_load() {
        let mut store = FlashSettingsStore::new(RamFlash::blank(), BASE);
        let settings = Settings {
            report_interval_ms: 60_000,
            region: Region::Us915,
            subband: 2,
            data_rate: 1,
            confirmed: true,
        };
        store.save(&settings).unwrap();
        assert_eq!(store.load(), Ok(settings));
    }

    #[test]
    fn second_save_erases_before_writing() {
        let mut store = FlashSettingsStore::new(RamFlash::blank(), BASE);
        let mut settings = Settings::default();
        store.save(&settings).unwrap();
        settings.report_interval_ms = 5_000;
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap().report_interval_ms, 5_000);
        assert_eq!(store.release().erases, 2);
    }

    #[test]
    fn write_failure_is_a_storage_error() {
        let mut flash = RamFlash::blank();
        flash.fail_writes = true;
        let mut store = FlashSettingsStore::new(flash, BASE);
        assert_eq!(store.save(&Settings::default()), Err(SettingsError::Storage));
    }
}
