// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later


use crate::{
    digest_slot, get_config, get_current_rom, get_slot_offset, select_rom, set_config,
    set_current_rom, verify_slot, BootConfig, BootMode, Error, WriteSession,
};
use consts::{CHKSUM_INIT, IMAGE_ALIGN, ROM_MAGIC, ROM_MAGIC_NEW1, ROM_MAGIC_NEW2};
use embedded_storage::nor_flash::ReadNorFlash;
use sha2::{Digest, Sha256};
use sim::{FlashOp, SimFlash};

/// Builds images in the format checked by [`EspImage`](crate::EspImage).
pub struct EspImageBuilder {
    entry: u32,
    irom: Option<Vec<u8>>,
    segments: Vec<(u32, Vec<u8>)>,
}

impl EspImageBuilder {
    pub fn new(entry: u32) -> Self {
        Self {
            entry,
            irom: None,
            segments: Vec::new(),
        }
    }

    /// Make it a two-part image with a leading IROM segment.
    pub fn irom(mut self, data: &[u8]) -> Self {
        self.irom = Some(data.to_vec());
        self
    }

    pub fn segment(mut self, load_addr: u32, data: &[u8]) -> Self {
        self.segments.push((load_addr, data.to_vec()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(irom) = &self.irom {
            out.extend_from_slice(&[ROM_MAGIC_NEW1, ROM_MAGIC_NEW2, 0, 0]);
            out.extend_from_slice(&self.entry.to_le_bytes());
            out.extend_from_slice(&0x4020_0010u32.to_le_bytes());
            out.extend_from_slice(&(irom.len() as u32).to_le_bytes());
            out.extend_from_slice(irom);
        }
        out.extend_from_slice(&[ROM_MAGIC, self.segments.len() as u8, 0, 0]);
        out.extend_from_slice(&self.entry.to_le_bytes());

        let mut chksum = CHKSUM_INIT;
        for (load_addr, data) in &self.segments {
            out.extend_from_slice(&load_addr.to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(data);
            chksum = data.iter().fold(chksum, |acc, b| acc ^ b);
        }
        while (out.len() + 1) % IMAGE_ALIGN as usize != 0 {
            out.push(0);
        }
        out.push(chksum);
        out
    }
}

fn sample_image(entry: u32, size: usize) -> Vec<u8> {
    let code: Vec<u8> = (0..size).map(|i| (i * 7 + 3) as u8).collect();
    EspImageBuilder::new(entry)
        .segment(0x4010_0000, &code)
        .segment(0x3FFE_8000, &[0x42; 64])
        .build()
}

#[test]
fn update_flow() {
    let mut flash = SimFlash::new(64);
    let image = sample_image(0x4010_1000, 9000);

    // Fresh device: the loader writes the default layout.
    let decision = select_rom(&mut flash, false, None);
    assert_eq!(decision, Err(Error::NoBootableRom));
    let config = get_config(&mut flash).unwrap();
    assert_eq!(config.slots(), &[0x2000, 0x2_2000]);

    // Install into both slots in odd sized chunks.
    for slot in 0..2 {
        let offset = get_slot_offset(&mut flash, slot).unwrap().unwrap();
        let mut session = WriteSession::begin(offset);
        for chunk in image.chunks(333) {
            session.append(&mut flash, chunk).unwrap();
        }
        session.flush(&mut flash).unwrap();
        assert_eq!(session.bytes_written() as usize, image.len());
    }

    let info = verify_slot(&mut flash, &config, 1).unwrap();
    assert_eq!(info.length as usize, image.len());

    let mut sha = Sha256::new();
    digest_slot(&mut flash, &config, 1, &mut sha).unwrap();
    assert_eq!(sha.finalize(), Sha256::digest(&image));

    set_current_rom(&mut flash, 1).unwrap();
    let decision = select_rom(&mut flash, false, None).unwrap();
    assert_eq!(decision.rom, 1);
    assert_eq!(decision.offset, 0x2_2000);
    assert_eq!(decision.mode, BootMode::Standard);
}

#[test]
fn interrupted_update_falls_back() {
    let mut flash = SimFlash::new(64);
    let image = sample_image(0x4010_1000, 5000);
    let mut config = BootConfig::default_layout(flash.capacity() as u32);
    config.current_rom = 1;
    set_config(&mut flash, &config).unwrap();

    let mut session = WriteSession::begin(0x2000);
    session.append(&mut flash, &image).unwrap();

    // Slot 1 only gets half of its image.
    let mut session = WriteSession::begin(0x2_2000);
    session.append(&mut flash, &image[..image.len() / 2]).unwrap();

    let decision = select_rom(&mut flash, false, None).unwrap();
    assert_eq!(decision.rom, 0);
    assert_eq!(get_current_rom(&mut flash).unwrap(), 0);
}

#[test]
fn session_never_touches_other_sectors() {
    let mut flash = SimFlash::new(16);
    let image = sample_image(0, 6000);
    flash.load(0x4000, &[0x77; 0x1000]);

    let mut session = WriteSession::begin(0x2000);
    for chunk in image.chunks(1000) {
        session.append(&mut flash, chunk).unwrap();
    }
    session.flush(&mut flash).unwrap();

    let erased: Vec<u32> = flash
        .log()
        .iter()
        .filter_map(|op| match op {
            FlashOp::Erase(sector) => Some(*sector),
            _ => None,
        })
        .collect();
    assert_eq!(erased, vec![2, 3]);
    assert_eq!(flash.contents(0x4000, 0x1000), vec![0x77; 0x1000]);
}
