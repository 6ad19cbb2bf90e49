use embassy_stm32::flash::{Blocking, Error, Flash};

use crate::storage::{FlashSettingsStore, SectorFlash};

/// Sector 11 (128 KiB) of the STM32F405, offsets relative to the flash base.
pub const SETTINGS_SECTOR: u32 = 0x000E_0000;
const SECTOR_SIZE: u32 = 128 * 1024;

/// On-chip flash, restricted to the settings sector.
pub struct InternalFlash<'d> {
    flash: Flash<'d, Blocking>,
}

impl<'d> InternalFlash<'d> {
    pub fn new(flash: Flash<'d, Blocking>) -> Self {
        Self { flash }
    }

    /// Settings store on the last sector.
    pub fn settings_store(self) -> FlashSettingsStore<Self> {
        FlashSettingsStore::new(self, SETTINGS_SECTOR)
    }
}

impl SectorFlash for InternalFlash<'_> {
    type Error = Error;

    fn erase_sector(&mut self, address: u32) -> Result<(), Error> {
        self.flash.blocking_erase(address, address + SECTOR_SIZE)
    }

    fn read(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), Error> {
        self.flash.blocking_read(address, buffer)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        self.flash.blocking_write(address, data)
    }
}
