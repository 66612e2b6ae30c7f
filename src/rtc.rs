// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Control block in retained (RTC) memory.
//!
//! Survives warm resets but not power loss. It records how the running rom
//! was booted and can request a one-shot boot of another slot. A block whose
//! magic or checksum does not match is treated as absent as a whole.

use crate::boot::BootMode;
use crate::error::{Error, Result};
use crate::flash;
use consts::{RTC_DATA_OFFSET, RTC_DATA_SIZE, RTC_MAGIC};
use embedded_storage::{ReadStorage, Storage};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Encoded value of an unset temporary rom.
const NO_TEMP_ROM: u8 = 0xFF;

/// Offset of the checksum byte inside the block.
const CHKSUM_POS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ControlBlock {
    /// Mode requested for the next boot.
    pub next_mode: BootMode,
    /// Mode the running rom was booted in.
    pub last_mode: BootMode,
    /// Slot the running rom was booted from.
    pub last_rom: u8,
    /// Slot to boot once when `next_mode` is [`BootMode::TempRom`].
    pub temp_rom: Option<u8>,
}

impl Default for ControlBlock {
    fn default() -> Self {
        Self {
            next_mode: BootMode::Standard,
            last_mode: BootMode::Standard,
            last_rom: 0,
            temp_rom: None,
        }
    }
}

impl ControlBlock {
    /// Encode to the retained layout, checksum included.
    pub fn to_bytes(&self) -> [u8; RTC_DATA_SIZE] {
        let mut buf = [0u8; RTC_DATA_SIZE];
        buf[0..4].copy_from_slice(&RTC_MAGIC.to_le_bytes());
        buf[4] = self.next_mode as u8;
        buf[5] = self.last_mode as u8;
        buf[6] = self.last_rom;
        buf[7] = self.temp_rom.unwrap_or(NO_TEMP_ROM);
        buf[CHKSUM_POS] = flash::checksum(&buf[..CHKSUM_POS]);
        buf
    }

    /// Decode the retained layout. Any inconsistency means no data.
    pub fn from_bytes(buf: &[u8; RTC_DATA_SIZE]) -> Result<Self> {
        if buf[0..4] != RTC_MAGIC.to_le_bytes() {
            return Err(Error::NoData);
        }
        if buf[CHKSUM_POS] != flash::checksum(&buf[..CHKSUM_POS]) {
            return Err(Error::NoData);
        }
        Ok(Self {
            next_mode: BootMode::try_from(buf[4])?,
            last_mode: BootMode::try_from(buf[5])?,
            last_rom: buf[6],
            temp_rom: match buf[7] {
                NO_TEMP_ROM => None,
                rom => Some(rom),
            },
        })
    }
}

/// Read and validate the control block.
pub fn get_rtc_data<M: ReadStorage>(mem: &mut M) -> Result<ControlBlock> {
    let mut buf = [0u8; RTC_DATA_SIZE];
    mem.read(RTC_DATA_OFFSET, &mut buf)
        .map_err(|_| Error::Retained)?;
    ControlBlock::from_bytes(&buf).inspect_err(|_| debug!("no valid control block"))
}

/// Write the control block, computing its checksum.
pub fn set_rtc_data<M: Storage>(mem: &mut M, block: &ControlBlock) -> Result<()> {
    mem.write(RTC_DATA_OFFSET, &block.to_bytes())
        .map_err(|_| Error::Retained)
}

/// Boot `rom` once on the next reset without touching the stored configuration.
pub fn set_temp_rom<M: Storage>(mem: &mut M, rom: u8) -> Result<()> {
    let mut block = match get_rtc_data(mem) {
        Ok(block) => block,
        Err(Error::NoData) => ControlBlock::default(),
        Err(e) => return Err(e),
    };
    block.next_mode = BootMode::TempRom;
    block.temp_rom = Some(rom);
    info!("temporary rom {} requested", rom);
    set_rtc_data(mem, &block)
}

/// Slot the running rom was booted from, temporary boots included.
pub fn get_last_boot_rom<M: ReadStorage>(mem: &mut M) -> Result<u8> {
    Ok(get_rtc_data(mem)?.last_rom)
}

/// Mode the running rom was booted in.
pub fn get_last_boot_mode<M: ReadStorage>(mem: &mut M) -> Result<BootMode> {
    Ok(get_rtc_data(mem)?.last_mode)
}
