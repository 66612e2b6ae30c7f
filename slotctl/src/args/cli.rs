//! Command line arguments.

use std::path::PathBuf;

#[derive(clap::Parser)]
pub struct Args {
    /// Path to the raw flash dump.
    #[clap(short, long, global = true)]
    pub flash: Option<PathBuf>,
    /// Path to config file.
    #[clap(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Create an erased flash dump holding the default boot configuration.
    Init {
        /// Flash size in bytes, decimal or 0x-prefixed hex.
        #[clap(long)]
        size: String,
    },
    /// Print the boot configuration and the state of every slot.
    Info {
        /// Print the boot configuration as TOML.
        #[clap(long)]
        toml: bool,
    },
    /// Verify the image in a slot or at a flash offset.
    Verify {
        /// Slot index.
        #[clap(long)]
        slot: Option<u8>,
        /// Flash offset, decimal or 0x-prefixed hex.
        #[clap(long)]
        offset: Option<String>,
    },
    /// Print the SHA-256 of the verified image in a slot.
    Digest {
        /// Slot index.
        #[clap(long)]
        slot: u8,
    },
    /// Write an image file into a slot.
    Write {
        /// Slot index.
        #[clap(long)]
        slot: u8,
        /// The image file.
        #[clap(short, long)]
        input: PathBuf,
        /// Bytes handed to the write session at a time.
        #[clap(long)]
        chunk_size: Option<usize>,
    },
    /// Select the slot booted by default.
    SetRom {
        /// Slot index.
        #[clap(long)]
        slot: u8,
    },
}
