// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Binary layout shared with the boot-time loader.
//! None of these values may change without rebuilding the loader as well.

#![no_std]

/// Size of a flash sector in bytes (4KB).
/// Sectors are the erase granularity of the SPI flash.
pub const SECTOR_SIZE: u32 = 0x1000;

/// Index of the sector holding the boot configuration.
/// Sector 0 holds the loader itself, so the configuration lives right after it.
pub const BOOT_CONFIG_SECTOR: u32 = 1;

/// Magic byte identifying a boot configuration.
pub const BOOT_CONFIG_MAGIC: u8 = 0xE1;

/// Version of the boot configuration layout.
pub const BOOT_CONFIG_VERSION: u8 = 0x01;

/// Number of ROM slot offsets stored in the boot configuration.
pub const MAX_ROMS: usize = 4;

/// Size of the boot configuration footprint inside its sector.
/// Magic, version, mode, current rom, gpio rom, count, two padding bytes and the slot table.
#[cfg(not(feature = "config-checksum"))]
pub const BOOT_CONFIG_SIZE: usize = 8 + 4 * MAX_ROMS;

/// Size of the boot configuration footprint inside its sector.
/// One trailing checksum byte follows the slot table.
#[cfg(feature = "config-checksum")]
pub const BOOT_CONFIG_SIZE: usize = 8 + 4 * MAX_ROMS + 1;

/// Bytes read when loading the boot configuration, its size rounded up to whole words.
pub const BOOT_CONFIG_READ_SIZE: usize =
    BOOT_CONFIG_SIZE.div_ceil(WRITE_ALIGN as usize) * WRITE_ALIGN as usize;

/// Seed of the 8-bit XOR checksum used by the configuration,
/// the retained control block and the image format.
pub const CHKSUM_INIT: u8 = 0xEF;

/// Magic word identifying a retained control block.
pub const RTC_MAGIC: u32 = 0x2334_AE68;

/// Byte offset of the control block in retained memory (word 64).
pub const RTC_DATA_OFFSET: u32 = 64 * 4;

/// Size of the control block in retained memory, padded to whole words.
pub const RTC_DATA_SIZE: usize = 12;

/// Flash write granularity in bytes.
/// Every write must start on, and cover, a whole number of these units.
pub const WRITE_ALIGN: u32 = 4;

/// First byte of a plain application image header.
pub const ROM_MAGIC: u8 = 0xE9;

/// First byte of the two-part image header (IROM section first).
pub const ROM_MAGIC_NEW1: u8 = 0xEA;

/// Second byte of the two-part image header.
pub const ROM_MAGIC_NEW2: u8 = 0x04;

/// Maximum distance an image may extend from its start offset (1MB).
pub const IMAGE_SIZE_LIMIT: u32 = 0x10_0000;

/// Maximum number of checksummed segments in an image.
pub const MAX_SEGMENTS: u8 = 16;

/// Images end on a boundary of this many bytes, the checksum being the last byte.
pub const IMAGE_ALIGN: u32 = 16;

/// Value of erased flash.
pub const ERASED_BYTE: u8 = 0xFF;
