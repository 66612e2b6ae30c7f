// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Persistent boot configuration.
//!
//! The configuration occupies the start of [`consts::BOOT_CONFIG_SECTOR`].
//! The rest of that sector belongs to the application and is preserved by
//! every write, which always rewrites the whole sector.

use crate::error::{Error, Result};
use crate::flash;
use bitflags::bitflags;
use consts::{
    BOOT_CONFIG_MAGIC, BOOT_CONFIG_READ_SIZE, BOOT_CONFIG_SECTOR, BOOT_CONFIG_SIZE,
    BOOT_CONFIG_VERSION, MAX_ROMS, SECTOR_SIZE,
};
use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Flash address of the boot configuration.
pub const BOOT_CONFIG_ADDR: u32 = BOOT_CONFIG_SECTOR * SECTOR_SIZE;

bitflags! {
    /// Loader behaviour flags stored in the configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct ConfigMode: u8 {
        /// Boot `gpio_rom` while the boot pin is held.
        const GPIO_ROM = 0x01;
        /// Temporary rom support is enabled in the loader.
        const TEMP_ROM = 0x02;
        /// Holding the boot pin also erases the SDK configuration area.
        const GPIO_ERASES_SDKCONFIG = 0x04;
        /// Holding the boot pin skips to the next rom.
        const GPIO_SKIP = 0x08;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BootConfig {
    pub mode: ConfigMode,
    /// Slot booted on a standard boot.
    pub current_rom: u8,
    /// Slot booted when the boot pin is held in [`ConfigMode::GPIO_ROM`] mode.
    pub gpio_rom: u8,
    /// Number of configured slots.
    pub count: u8,
    /// Flash offset of each slot; entries past `count` are unused.
    pub roms: [u32; MAX_ROMS],
}

impl BootConfig {
    /// Layout used when the flash holds no configuration yet: two slots, the
    /// first right after the configuration sector and the second at the same
    /// distance past half of the flash.
    pub fn default_layout(capacity: u32) -> Self {
        let first = SECTOR_SIZE * (BOOT_CONFIG_SECTOR + 1);
        let mut roms = [0; MAX_ROMS];
        roms[0] = first;
        roms[1] = capacity / 2 + first;
        Self {
            mode: ConfigMode::empty(),
            current_rom: 0,
            gpio_rom: 0,
            count: 2,
            roms,
        }
    }

    /// Offsets of the configured slots.
    pub fn slots(&self) -> &[u32] {
        &self.roms[..usize::from(self.count).min(MAX_ROMS)]
    }

    /// Offset of `slot`, or `None` when it is not configured.
    pub fn slot_offset(&self, slot: u8) -> Option<u32> {
        self.slots().get(usize::from(slot)).copied()
    }

    /// Replace the slot table.
    pub fn set_slots(&mut self, offsets: &[u32]) -> Result<()> {
        if offsets.is_empty() || offsets.len() > MAX_ROMS {
            return Err(Error::InvalidConfig);
        }
        self.roms = [0; MAX_ROMS];
        self.roms[..offsets.len()].copy_from_slice(offsets);
        self.count = offsets.len() as u8;
        Ok(())
    }

    /// Check the invariants the loader relies on.
    pub fn validate(&self, capacity: u32) -> Result<()> {
        let count = usize::from(self.count);
        if count == 0 || count > MAX_ROMS {
            return Err(Error::InvalidConfig);
        }
        if self.current_rom >= self.count || self.gpio_rom >= self.count {
            return Err(Error::InvalidConfig);
        }
        let first_free = SECTOR_SIZE * (BOOT_CONFIG_SECTOR + 1);
        for &offset in self.slots() {
            if offset % SECTOR_SIZE != 0 || offset < first_free || offset >= capacity {
                return Err(Error::InvalidConfig);
            }
        }
        Ok(())
    }

    /// Encode to the on-flash layout.
    pub fn to_bytes(&self) -> [u8; BOOT_CONFIG_SIZE] {
        let mut buf = [0u8; BOOT_CONFIG_SIZE];
        buf[0] = BOOT_CONFIG_MAGIC;
        buf[1] = BOOT_CONFIG_VERSION;
        buf[2] = self.mode.bits();
        buf[3] = self.current_rom;
        buf[4] = self.gpio_rom;
        buf[5] = self.count;
        for (i, rom) in self.roms.iter().enumerate() {
            buf[8 + i * 4..12 + i * 4].copy_from_slice(&rom.to_le_bytes());
        }
        #[cfg(feature = "config-checksum")]
        {
            buf[BOOT_CONFIG_SIZE - 1] = flash::checksum(&buf[..BOOT_CONFIG_SIZE - 1]);
        }
        buf
    }

    /// Decode the on-flash layout.
    pub fn from_bytes(buf: &[u8; BOOT_CONFIG_SIZE]) -> Result<Self> {
        if buf[0] != BOOT_CONFIG_MAGIC || buf[1] != BOOT_CONFIG_VERSION {
            return Err(Error::NoConfig);
        }
        #[cfg(feature = "config-checksum")]
        if buf[BOOT_CONFIG_SIZE - 1] != flash::checksum(&buf[..BOOT_CONFIG_SIZE - 1]) {
            return Err(Error::NoData);
        }
        let mut roms = [0; MAX_ROMS];
        for (i, rom) in roms.iter_mut().enumerate() {
            let at = 8 + i * 4;
            *rom = u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        }
        Ok(Self {
            mode: ConfigMode::from_bits_retain(buf[2]),
            current_rom: buf[3],
            gpio_rom: buf[4],
            count: buf[5],
            roms,
        })
    }
}

/// Read the boot configuration.
///
/// A stored configuration that breaks the invariants checked by
/// [`BootConfig::validate`] is rejected as a whole with [`Error::InvalidConfig`].
pub fn get_config<F: ReadNorFlash>(flash: &mut F) -> Result<BootConfig> {
    let mut buf = [0u8; BOOT_CONFIG_READ_SIZE];
    flash::read(flash, BOOT_CONFIG_ADDR, &mut buf)?;
    let mut raw = [0u8; BOOT_CONFIG_SIZE];
    raw.copy_from_slice(&buf[..BOOT_CONFIG_SIZE]);
    let config = BootConfig::from_bytes(&raw)?;

    let capacity = u32::try_from(flash.capacity()).unwrap_or(u32::MAX);
    if let Err(e) = config.validate(capacity) {
        warn!("stored boot configuration is inconsistent");
        return Err(e);
    }
    Ok(config)
}

/// Write the boot configuration.
///
/// The configuration sector is read, patched with the new structure, erased
/// and written back whole, so bytes outside the structure survive. Nothing
/// is written if the configuration is invalid or unchanged.
pub fn set_config<F: NorFlash>(flash: &mut F, config: &BootConfig) -> Result<()> {
    flash::check_sector_size::<F>()?;
    let capacity = u32::try_from(flash.capacity()).unwrap_or(u32::MAX);
    if let Err(e) = config.validate(capacity) {
        warn!("refusing to write invalid boot configuration");
        return Err(e);
    }

    let mut sector = [0u8; SECTOR_SIZE as usize];
    flash::read(flash, BOOT_CONFIG_ADDR, &mut sector)?;
    let encoded = config.to_bytes();
    if sector[..BOOT_CONFIG_SIZE] == encoded {
        debug!("boot configuration unchanged");
        return Ok(());
    }
    sector[..BOOT_CONFIG_SIZE].copy_from_slice(&encoded);

    flash::erase_sector(flash, BOOT_CONFIG_SECTOR)?;
    flash::write(flash, BOOT_CONFIG_ADDR, &sector)?;
    info!(
        "boot configuration written, current rom {}, {} roms",
        config.current_rom, config.count
    );
    Ok(())
}

/// Slot selected for the next standard boot.
pub fn get_current_rom<F: ReadNorFlash>(flash: &mut F) -> Result<u8> {
    Ok(get_config(flash)?.current_rom)
}

/// Select the slot for the next standard boot.
///
/// Rewrites the whole configuration, like [`set_config`].
pub fn set_current_rom<F: NorFlash>(flash: &mut F, rom: u8) -> Result<()> {
    let mut config = get_config(flash)?;
    if rom >= config.count {
        return Err(Error::InvalidSlot(rom));
    }
    config.current_rom = rom;
    set_config(flash, &config)
}

/// Flash offset of `slot` in the stored configuration, `None` if it is not configured.
pub fn get_slot_offset<F: ReadNorFlash>(flash: &mut F, slot: u8) -> Result<Option<u32>> {
    Ok(get_config(flash)?.slot_offset(slot))
}
