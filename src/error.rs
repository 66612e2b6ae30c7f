// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::image::ImageError;
use embedded_storage::nor_flash::NorFlashErrorKind;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Erasing a flash sector failed.
    Erase { sector: u32, kind: NorFlashErrorKind },
    /// Reading flash failed.
    Read { offset: u32, kind: NorFlashErrorKind },
    /// Writing flash failed.
    Write { offset: u32, kind: NorFlashErrorKind },
    /// Reading or writing retained memory failed.
    Retained,
    /// The configuration sector holds no boot configuration.
    NoConfig,
    /// A checksum-guarded structure failed validation and must be treated as absent.
    NoData,
    /// The boot configuration violates its invariants and was not written.
    InvalidConfig,
    /// The slot index is not configured.
    InvalidSlot(u8),
    /// The flash erase size does not match the sector size of the layout.
    SectorSize { expected: u32, actual: u32 },
    /// The image in a slot failed verification.
    Image(ImageError),
    /// No configured slot holds a valid image.
    NoBootableRom,
}

impl From<ImageError> for Error {
    fn from(e: ImageError) -> Self {
        Error::Image(e)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Erase { sector, kind } => write!(f, "erase of sector {sector} failed: {kind:?}"),
            Self::Read { offset, kind } => write!(f, "flash read at {offset:#x} failed: {kind:?}"),
            Self::Write { offset, kind } => {
                write!(f, "flash write at {offset:#x} failed: {kind:?}")
            }
            Self::Retained => write!(f, "retained memory access failed"),
            Self::NoConfig => write!(f, "no boot configuration found"),
            Self::NoData => write!(f, "checksum mismatch, no valid data"),
            Self::InvalidConfig => write!(f, "invalid boot configuration"),
            Self::InvalidSlot(slot) => write!(f, "slot {slot} is not configured"),
            Self::SectorSize { expected, actual } => {
                write!(f, "flash erase size is {actual}, expected {expected}")
            }
            Self::Image(e) => write!(f, "invalid image: {e}"),
            Self::NoBootableRom => write!(f, "no bootable rom found"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Erase { sector, kind } => {
                defmt::write!(f, "erase of sector {} failed: {}", sector, defmt::Debug2Format(kind))
            }
            Self::Read { offset, kind } => defmt::write!(
                f,
                "flash read at {:#x} failed: {}",
                offset,
                defmt::Debug2Format(kind)
            ),
            Self::Write { offset, kind } => defmt::write!(
                f,
                "flash write at {:#x} failed: {}",
                offset,
                defmt::Debug2Format(kind)
            ),
            Self::Retained => defmt::write!(f, "retained memory access failed"),
            Self::NoConfig => defmt::write!(f, "no boot configuration found"),
            Self::NoData => defmt::write!(f, "checksum mismatch, no valid data"),
            Self::InvalidConfig => defmt::write!(f, "invalid boot configuration"),
            Self::InvalidSlot(slot) => defmt::write!(f, "slot {} is not configured", slot),
            Self::SectorSize { expected, actual } => {
                defmt::write!(f, "flash erase size is {}, expected {}", actual, expected)
            }
            Self::Image(e) => defmt::write!(f, "invalid image: {}", e.message()),
            Self::NoBootableRom => defmt::write!(f, "no bootable rom found"),
        }
    }
}
