// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Choosing the slot to boot at reset.
//!
//! Precedence is: a temporary rom request, then the gpio rom while the boot
//! pin is held, then the configured current rom. A slot whose image fails
//! verification is skipped in favour of the following slots.

use crate::config::{self, BootConfig, ConfigMode};
use crate::error::{Error, Result};
use crate::image;
use embedded_storage::nor_flash::NorFlash;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a rom was, or is to be, booted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum BootMode {
    /// The configured current rom.
    Standard = 0,
    /// The gpio rom, selected by holding the boot pin.
    GpioRom = 1,
    /// A one-shot temporary rom.
    TempRom = 2,
}

impl TryFrom<u8> for BootMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Standard),
            1 => Ok(Self::GpioRom),
            2 => Ok(Self::TempRom),
            _ => Err(Error::NoData),
        }
    }
}

/// Outcome of slot selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootDecision {
    pub rom: u8,
    /// Flash offset of the image.
    pub offset: u32,
    /// Verified image length.
    pub length: u32,
    pub mode: BootMode,
}

/// Pick the slot to boot.
///
/// A missing configuration is replaced by [`BootConfig::default_layout`] and
/// written out. `temp_rom` is honoured once, for this call only; it is
/// ignored if the slot is not configured. When a standard boot has to fall
/// back to another slot, or the boot pin skips to the next one, the new
/// current rom is persisted.
pub fn select_rom<F: NorFlash>(
    flash: &mut F,
    gpio_pressed: bool,
    temp_rom: Option<u8>,
) -> Result<BootDecision> {
    let mut config = match config::get_config(flash) {
        Ok(config) => config,
        Err(Error::NoConfig | Error::NoData) => {
            warn!("no boot configuration, writing default");
            let capacity = u32::try_from(flash.capacity()).unwrap_or(u32::MAX);
            let config = BootConfig::default_layout(capacity);
            config::set_config(flash, &config)?;
            config
        }
        Err(e) => return Err(e),
    };
    // Validated by get_config and set_config.
    let count = config.count;

    let mut update_config = false;
    let (mut rom, mut mode) = match temp_rom {
        Some(rom) if rom < count => (rom, BootMode::TempRom),
        _ if gpio_pressed && config.mode.contains(ConfigMode::GPIO_ROM) => {
            (config.gpio_rom, BootMode::GpioRom)
        }
        _ if gpio_pressed && config.mode.contains(ConfigMode::GPIO_SKIP) => {
            update_config = true;
            ((config.current_rom + 1) % count, BootMode::Standard)
        }
        _ => (config.current_rom, BootMode::Standard),
    };
    if rom >= count {
        warn!("gpio rom {} is not configured", rom);
        rom = config.current_rom;
        mode = BootMode::Standard;
    }

    let mut found = try_slot(flash, &config, rom);
    if found.is_none() && mode != BootMode::Standard {
        warn!("rom {} is not bootable, using current rom", rom);
        rom = config.current_rom;
        mode = BootMode::Standard;
        found = try_slot(flash, &config, rom);
    }
    if found.is_none() {
        for step in 1..count {
            let candidate = (rom + step) % count;
            found = try_slot(flash, &config, candidate);
            if found.is_some() {
                warn!("rom {} is not bootable, falling back to rom {}", rom, candidate);
                rom = candidate;
                update_config = true;
                break;
            }
        }
    }
    let Some((offset, length)) = found else {
        error!("no bootable rom found");
        return Err(Error::NoBootableRom);
    };

    if update_config && mode == BootMode::Standard && config.current_rom != rom {
        config.current_rom = rom;
        config::set_config(flash, &config)?;
    }

    info!("booting rom {} at {:#x}", rom, offset);
    Ok(BootDecision {
        rom,
        offset,
        length,
        mode,
    })
}

fn try_slot<F: NorFlash>(flash: &mut F, config: &BootConfig, rom: u8) -> Option<(u32, u32)> {
    let offset = config.slot_offset(rom)?;
    image::verify_slot(flash, config, rom)
        .ok()
        .map(|info| (offset, info.length))
}

/// Select the slot using, and then recording into, the retained control block.
///
/// A pending temporary rom is consumed: the block is rewritten with the
/// outcome of this boot and a standard next mode.
#[cfg(feature = "rtc-data")]
pub fn boot_with_retained<F: NorFlash, M: embedded_storage::Storage>(
    flash: &mut F,
    mem: &mut M,
    gpio_pressed: bool,
) -> Result<BootDecision> {
    use crate::rtc::{self, ControlBlock};

    let temp_rom = match rtc::get_rtc_data(mem) {
        Ok(block) if block.next_mode == BootMode::TempRom => block.temp_rom,
        Ok(_) | Err(Error::NoData) => None,
        Err(e) => return Err(e),
    };
    let decision = select_rom(flash, gpio_pressed, temp_rom)?;
    rtc::set_rtc_data(
        mem,
        &ControlBlock {
            next_mode: BootMode::Standard,
            last_mode: decision.mode,
            last_rom: decision.rom,
            temp_rom: None,
        },
    )?;
    Ok(decision)
}
