// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Application image verification.
//!
//! Images are checked in place on flash, without assuming anything about
//! which slot is currently running. The layout is pluggable through
//! [`ImageFormat`]; [`EspImage`] is the format produced by the packaging tool
//! in use today:
//!
//! ```text
//! header   magic(0xE9) segments flash_mode flash_size_freq entry(u32 LE)
//! segment  load_addr(u32 LE) length(u32 LE) data[length]   (repeated)
//! padding  up to the next 16 byte boundary, the last byte being the checksum
//! ```
//!
//! The two-part variant starts with a `0xEA 0x04` header followed by a single
//! IROM segment, which is not covered by the checksum, and then a plain image.

use crate::config::BootConfig;
use crate::error::{Error, Result};
use crate::flash;
use consts::{
    CHKSUM_INIT, IMAGE_ALIGN, IMAGE_SIZE_LIMIT, MAX_SEGMENTS, ROM_MAGIC, ROM_MAGIC_NEW1,
    ROM_MAGIC_NEW2, WRITE_ALIGN,
};
use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind, ReadNorFlash};

/// Size of the image header and of each segment header.
pub const HEADER_SIZE: u32 = 8;

/// Why an image failed verification.
///
/// Meant for logging; callers branch on the `Result`, not on the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    Unaligned,
    Flash(NorFlashErrorKind),
    BadMagic,
    BadSecondMagic,
    NoSegments,
    TooManySegments,
    SegmentUnaligned,
    SegmentOutOfBounds,
    ChecksumMismatch,
    ExceedsSlot,
}

impl ImageError {
    /// Static human readable reason.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Unaligned => "unaligned flash offset",
            Self::Flash(_) => "flash read failed",
            Self::BadMagic => "bad magic",
            Self::BadSecondMagic => "bad second magic",
            Self::NoSegments => "no segments",
            Self::TooManySegments => "too many segments",
            Self::SegmentUnaligned => "segment length unaligned",
            Self::SegmentOutOfBounds => "segment out of bounds",
            Self::ChecksumMismatch => "checksum mismatch",
            Self::ExceedsSlot => "image exceeds slot",
        }
    }
}

impl core::fmt::Display for ImageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.message())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ImageError {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.message())
    }
}

/// What verification learned about a valid image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImageInfo {
    /// Total length on flash, header, segments and padding included.
    pub length: u32,
    /// Entry point from the header.
    pub entry: u32,
    /// Number of checksummed segments.
    pub segments: u8,
    /// Whether the image is of the two-part kind with a leading IROM segment.
    pub irom: bool,
}

/// An on-flash image layout.
pub trait ImageFormat {
    /// Validate the image at `offset`. Nothing at or past `limit` may belong to it.
    fn verify<F: ReadNorFlash>(
        &self,
        flash: &mut F,
        offset: u32,
        limit: u32,
    ) -> core::result::Result<ImageInfo, ImageError>;
}

/// The ESP8266 application image format.
#[derive(Debug, Default, Clone, Copy)]
pub struct EspImage;

struct Segment {
    length: u32,
}

fn le32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

impl ImageFormat for EspImage {
    fn verify<F: ReadNorFlash>(
        &self,
        flash: &mut F,
        offset: u32,
        limit: u32,
    ) -> core::result::Result<ImageInfo, ImageError> {
        if offset % WRITE_ALIGN != 0 {
            return Err(ImageError::Unaligned);
        }

        let mut pos = offset;
        let mut header = read_block(flash, pos, limit)?;
        pos += HEADER_SIZE;

        let irom = match header[0] {
            ROM_MAGIC => false,
            ROM_MAGIC_NEW1 if header[1] == ROM_MAGIC_NEW2 => {
                let irom = read_segment(flash, &mut pos, limit)?;
                pos += irom.length;
                header = read_block(flash, pos, limit)?;
                pos += HEADER_SIZE;
                if header[0] != ROM_MAGIC {
                    return Err(ImageError::BadSecondMagic);
                }
                true
            }
            _ => return Err(ImageError::BadMagic),
        };

        let segments = header[1];
        if segments == 0 {
            return Err(ImageError::NoSegments);
        }
        if segments > MAX_SEGMENTS {
            return Err(ImageError::TooManySegments);
        }
        let entry = le32(&header[4..8]);

        let mut chksum = CHKSUM_INIT;
        for _ in 0..segments {
            let segment = read_segment(flash, &mut pos, limit)?;
            let mut remaining = segment.length;
            let mut chunk = [0u8; 64];
            while remaining > 0 {
                let len = remaining.min(chunk.len() as u32);
                let buf = &mut chunk[..len as usize];
                flash
                    .read(pos, buf)
                    .map_err(|e| ImageError::Flash(e.kind()))?;
                chksum = flash::checksum_update(chksum, buf);
                pos += len;
                remaining -= len;
            }
        }

        // The checksum is the last byte of the padding up to the next boundary.
        let end = (pos | (IMAGE_ALIGN - 1)) + 1;
        if end > limit {
            return Err(ImageError::SegmentOutOfBounds);
        }
        let mut tail = [0u8; WRITE_ALIGN as usize];
        flash
            .read(end - WRITE_ALIGN, &mut tail)
            .map_err(|e| ImageError::Flash(e.kind()))?;
        if tail[tail.len() - 1] != chksum {
            return Err(ImageError::ChecksumMismatch);
        }

        Ok(ImageInfo {
            length: end - offset,
            entry,
            segments,
            irom,
        })
    }
}

/// Read an 8 byte header at `pos`.
fn read_block<F: ReadNorFlash>(
    flash: &mut F,
    pos: u32,
    limit: u32,
) -> core::result::Result<[u8; HEADER_SIZE as usize], ImageError> {
    match pos.checked_add(HEADER_SIZE) {
        Some(end) if end <= limit => {}
        _ => return Err(ImageError::SegmentOutOfBounds),
    }
    let mut block = [0u8; HEADER_SIZE as usize];
    flash
        .read(pos, &mut block)
        .map_err(|e| ImageError::Flash(e.kind()))?;
    Ok(block)
}

/// Read a segment header, leaving `pos` at the start of its data.
fn read_segment<F: ReadNorFlash>(
    flash: &mut F,
    pos: &mut u32,
    limit: u32,
) -> core::result::Result<Segment, ImageError> {
    let block = read_block(flash, *pos, limit)?;
    *pos += HEADER_SIZE;
    // The load address is only of interest to the loader.
    let segment = Segment {
        length: le32(&block[4..8]),
    };
    if segment.length % WRITE_ALIGN != 0 {
        return Err(ImageError::SegmentUnaligned);
    }
    match pos.checked_add(segment.length) {
        Some(end) if end <= limit => Ok(segment),
        _ => Err(ImageError::SegmentOutOfBounds),
    }
}

/// Hard ceiling for an image starting at `offset`.
fn image_limit<F: ReadNorFlash>(flash: &F, offset: u32) -> u32 {
    let capacity = u32::try_from(flash.capacity()).unwrap_or(u32::MAX);
    offset.saturating_add(IMAGE_SIZE_LIMIT).min(capacity)
}

/// Verify the image at `offset` with the built-in format.
pub fn verify_image<F: ReadNorFlash>(
    flash: &mut F,
    offset: u32,
) -> core::result::Result<ImageInfo, ImageError> {
    verify_image_with(&EspImage, flash, offset)
}

/// Verify the image at `offset` with a caller supplied format.
pub fn verify_image_with<F: ReadNorFlash, I: ImageFormat>(
    format: &I,
    flash: &mut F,
    offset: u32,
) -> core::result::Result<ImageInfo, ImageError> {
    let limit = image_limit(flash, offset);
    let result = format.verify(flash, offset, limit);
    match &result {
        Ok(info) => debug!("image at {:#x} valid, {} bytes", offset, info.length),
        Err(e) => warn!("image at {:#x} invalid: {}", offset, e.message()),
    }
    result
}

/// Verify the image in a configured slot.
///
/// On top of the format checks the image must end before the next slot
/// begins, or before the end of flash for the highest slot.
pub fn verify_slot<F: ReadNorFlash>(
    flash: &mut F,
    config: &BootConfig,
    slot: u8,
) -> Result<ImageInfo> {
    let offset = config.slot_offset(slot).ok_or(Error::InvalidSlot(slot))?;
    let info = verify_image(flash, offset)?;
    let slot_end = config
        .slots()
        .iter()
        .copied()
        .filter(|&o| o > offset)
        .min()
        .unwrap_or_else(|| image_limit(flash, offset));
    if offset + info.length > slot_end {
        warn!("image in slot {} runs into the next slot", slot);
        return Err(ImageError::ExceedsSlot.into());
    }
    Ok(info)
}
