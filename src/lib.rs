// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Flash resident boot control.
//!
//! Three pieces cooperate with a boot-time loader that picks one of several
//! application slots on SPI flash:
//!
//! - [`WriteSession`] streams a new image into a slot, erasing sectors lazily.
//! - [`verify_image`] and [`digest_image`] check an image in place.
//! - [`get_config`]/[`set_config`] and, with the `rtc-data` feature, the
//!   retained [`ControlBlock`] hold the state the loader reads at reset.
//!
//! Flash is accessed through the `embedded-storage` NOR flash traits, so the
//! same code runs against the real SPI driver and a file on the host.

#![cfg_attr(not(test), no_std)]

// Must come first so the macros are visible to the other modules.
mod fmt;

mod boot;
mod config;
mod digest;
mod error;
pub mod flash;
mod image;
#[cfg(feature = "rtc-data")]
mod rtc;
mod write;

#[cfg(test)]
mod tests;

pub use consts;

pub use crate::boot::{select_rom, BootDecision, BootMode};
#[cfg(feature = "rtc-data")]
pub use crate::boot::boot_with_retained;
pub use crate::config::{
    get_config, get_current_rom, get_slot_offset, set_config, set_current_rom, BootConfig,
    ConfigMode, BOOT_CONFIG_ADDR,
};
pub use crate::digest::{digest_image, digest_slot, DigestSink, DIGEST_CHUNK};
pub use crate::error::{Error, Result};
pub use crate::image::{
    verify_image, verify_image_with, verify_slot, EspImage, ImageError, ImageFormat, ImageInfo,
    HEADER_SIZE,
};
#[cfg(feature = "rtc-data")]
pub use crate::rtc::{
    get_last_boot_mode, get_last_boot_rom, get_rtc_data, set_rtc_data, set_temp_rom,
    ControlBlock,
};
pub use crate::write::WriteSession;
