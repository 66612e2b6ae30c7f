// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Streaming image writes.
//!
//! A [`WriteSession`] accepts an image in chunks of any size and alignment.
//! Sectors are erased lazily, the first time the write cursor reaches them,
//! and never more than once per session. Bytes that do not fill a whole
//! write unit are carried over to the next call.

use crate::error::Result;
use crate::flash;
use consts::{ERASED_BYTE, WRITE_ALIGN};
use embedded_storage::nor_flash::NorFlash;
use heapless::Vec;

const UNIT: usize = WRITE_ALIGN as usize;

/// State of one image transfer into flash.
///
/// Created by [`WriteSession::begin`] and fed with [`WriteSession::append`].
/// Holds no flash-side state: dropping it mid-transfer leaves a partially
/// written image that must not be trusted until it verifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSession {
    start_addr: u32,
    start_sector: u32,
    /// Next flash address to be written, always aligned to the write unit.
    cursor: u32,
    /// Total bytes accepted, including carried ones.
    accepted: u32,
    last_sector_erased: Option<u32>,
    extra: Vec<u8, UNIT>,
}

impl WriteSession {
    /// Start a write at `start_addr`. No flash access happens until data is appended.
    ///
    /// `start_addr` must lie in writable flash and be aligned to [`WRITE_ALIGN`].
    pub fn begin(start_addr: u32) -> Self {
        let start_sector = start_addr / consts::SECTOR_SIZE;
        info!(
            "write session at {:#x}, sector {}",
            start_addr, start_sector
        );
        Self {
            start_addr,
            start_sector,
            cursor: start_addr,
            accepted: 0,
            last_sector_erased: None,
            extra: Vec::new(),
        }
    }

    pub fn start_addr(&self) -> u32 {
        self.start_addr
    }

    pub fn start_sector(&self) -> u32 {
        self.start_sector
    }

    /// Next flash address that will be written.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Number of bytes accepted so far, whether written or still carried.
    pub fn bytes_written(&self) -> u32 {
        self.accepted
    }

    /// Highest sector erased by this session, if any.
    pub fn last_sector_erased(&self) -> Option<u32> {
        self.last_sector_erased
    }

    /// Bytes waiting for a full write unit.
    pub fn pending(&self) -> &[u8] {
        &self.extra
    }

    /// Append `data` at the write cursor.
    ///
    /// Every sector touched by the aligned part of the chunk is erased before
    /// anything is written to it. On failure the cursor and carried bytes are
    /// left as they were before the call, while sectors already erased stay
    /// recorded so a retry does not erase them again. Bytes already written by
    /// the failed call are not rolled back.
    pub fn append<F: NorFlash>(&mut self, flash: &mut F, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        flash::check_sector_size::<F>()?;

        let carried = self.extra.len();
        let total = carried + data.len();
        let aligned = total - total % UNIT;
        if aligned == 0 {
            // Still less than one unit, nothing to write yet.
            self.stash(data);
            self.accepted += data.len() as u32;
            return Ok(());
        }

        let end = self.cursor + aligned as u32;
        self.erase_through(flash, flash::sector_of::<F>(end - 1))?;

        let mut offset = self.cursor;
        let mut consumed = 0;
        if carried > 0 {
            let mut unit = [0u8; UNIT];
            unit[..carried].copy_from_slice(&self.extra);
            consumed = UNIT - carried;
            unit[carried..].copy_from_slice(&data[..consumed]);
            flash::write(flash, offset, &unit)?;
            offset += WRITE_ALIGN;
        }
        let body = aligned - if carried > 0 { UNIT } else { 0 };
        if body > 0 {
            flash::write(flash, offset, &data[consumed..consumed + body])?;
            offset += body as u32;
        }
        consumed += body;

        self.cursor = offset;
        self.accepted += data.len() as u32;
        self.extra.clear();
        self.stash(&data[consumed..]);
        trace!(
            "wrote {} bytes, cursor {:#x}, {} carried",
            aligned,
            self.cursor,
            self.extra.len()
        );
        Ok(())
    }

    /// Write out carried bytes, padded with the erased value to a whole unit.
    ///
    /// Optional: a session that is never flushed simply leaves its last 1-3
    /// bytes unwritten.
    pub fn flush<F: NorFlash>(&mut self, flash: &mut F) -> Result<()> {
        if self.extra.is_empty() {
            return Ok(());
        }
        flash::check_sector_size::<F>()?;

        let mut unit = [ERASED_BYTE; UNIT];
        unit[..self.extra.len()].copy_from_slice(&self.extra);
        self.erase_through(flash, flash::sector_of::<F>(self.cursor + WRITE_ALIGN - 1))?;
        flash::write(flash, self.cursor, &unit)?;
        debug!("flushed {} carried bytes at {:#x}", self.extra.len(), self.cursor);
        self.cursor += WRITE_ALIGN;
        self.extra.clear();
        Ok(())
    }

    /// Add bytes to the carry. Callers never pass more than fit in one unit.
    fn stash(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if self.extra.push(byte).is_err() {
                break;
            }
        }
    }

    /// Erase every sector after the last erased one, up to and including `sector`.
    fn erase_through<F: NorFlash>(&mut self, flash: &mut F, sector: u32) -> Result<()> {
        let mut next = match self.last_sector_erased {
            Some(last) => last + 1,
            None => self.start_sector,
        };
        while next <= sector {
            flash::erase_sector(flash, next)?;
            debug!("erased sector {}", next);
            self.last_sector_erased = Some(next);
            next += 1;
        }
        Ok(())
    }
}
