// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sector-level access to the SPI flash through the `embedded-storage` traits.

use crate::error::{Error, Result};
use embedded_storage::nor_flash::{NorFlash, NorFlashError, ReadNorFlash};

/// Index of the sector containing `addr`.
pub fn sector_of<F: NorFlash>(addr: u32) -> u32 {
    addr / F::ERASE_SIZE as u32
}

/// Erase one whole sector.
pub fn erase_sector<F: NorFlash>(flash: &mut F, sector: u32) -> Result<()> {
    let from = sector * F::ERASE_SIZE as u32;
    trace!("erase sector {} at {:#x}", sector, from);
    flash
        .erase(from, from + F::ERASE_SIZE as u32)
        .map_err(|e| {
            error!("erase of sector {} failed", sector);
            Error::Erase {
                sector,
                kind: e.kind(),
            }
        })
}

pub fn read<F: ReadNorFlash>(flash: &mut F, offset: u32, buf: &mut [u8]) -> Result<()> {
    flash.read(offset, buf).map_err(|e| {
        error!("flash read at {:#x} failed", offset);
        Error::Read {
            offset,
            kind: e.kind(),
        }
    })
}

pub fn write<F: NorFlash>(flash: &mut F, offset: u32, data: &[u8]) -> Result<()> {
    flash.write(offset, data).map_err(|e| {
        error!("flash write at {:#x} failed", offset);
        Error::Write {
            offset,
            kind: e.kind(),
        }
    })
}

/// Fail unless the flash erases in sectors of the size the loader expects.
pub fn check_sector_size<F: NorFlash>() -> Result<()> {
    if F::ERASE_SIZE as u32 != consts::SECTOR_SIZE {
        return Err(Error::SectorSize {
            expected: consts::SECTOR_SIZE,
            actual: F::ERASE_SIZE as u32,
        });
    }
    Ok(())
}

/// 8-bit XOR checksum seeded with [`consts::CHKSUM_INIT`].
pub fn checksum(data: &[u8]) -> u8 {
    checksum_update(consts::CHKSUM_INIT, data)
}

/// Continue an XOR checksum over more bytes.
pub fn checksum_update(seed: u8, data: &[u8]) -> u8 {
    data.iter().fold(seed, |acc, b| acc ^ b)
}
