// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Streaming flash contents into a hash.
//!
//! The engine knows nothing about image formats. Get a trustworthy length
//! from [`verify_image`](crate::image::verify_image) first, or use
//! [`digest_slot`] which does both.

use crate::config::BootConfig;
use crate::error::{Error, Result};
use crate::flash;
use crate::image::{self, ImageInfo};
use embedded_storage::nor_flash::{NorFlashErrorKind, ReadNorFlash};

/// Size of the scratch buffer flash is read through.
pub const DIGEST_CHUNK: usize = 128;

/// Consumer of the bytes being digested.
pub trait DigestSink {
    fn update(&mut self, data: &[u8]);
}

impl DigestSink for sha2::Sha256 {
    fn update(&mut self, data: &[u8]) {
        sha2::Digest::update(self, data)
    }
}

impl DigestSink for sha2::Sha512 {
    fn update(&mut self, data: &[u8]) {
        sha2::Digest::update(self, data)
    }
}

/// Feed `length` bytes of flash starting at `offset` into `sink`.
///
/// `offset` and `length` should be 4 byte aligned. If a read fails the sink
/// has already seen part of the data and must be discarded by the caller.
pub fn digest_image<F: ReadNorFlash, D: DigestSink>(
    flash: &mut F,
    offset: u32,
    length: u32,
    sink: &mut D,
) -> Result<()> {
    let mut buf = [0u8; DIGEST_CHUNK];
    let mut pos = offset;
    let end = offset.checked_add(length).ok_or(Error::Read {
        offset,
        kind: NorFlashErrorKind::OutOfBounds,
    })?;
    while pos < end {
        let len = (end - pos).min(DIGEST_CHUNK as u32) as usize;
        flash::read(flash, pos, &mut buf[..len])?;
        sink.update(&buf[..len]);
        pos += len as u32;
    }
    trace!("digested {} bytes at {:#x}", length, offset);
    Ok(())
}

/// Verify the image in `slot` and digest exactly the verified length.
pub fn digest_slot<F: ReadNorFlash, D: DigestSink>(
    flash: &mut F,
    config: &BootConfig,
    slot: u8,
    sink: &mut D,
) -> Result<ImageInfo> {
    let info = image::verify_slot(flash, config, slot)?;
    let offset = config.slots()[usize::from(slot)];
    digest_image(flash, offset, info.length, sink)?;
    Ok(info)
}
