use {clap::Parser, std::path::PathBuf};

mod cli;
mod config;

pub use config::Error as ConfigError;

/// Chunk size used by `write` when neither the CLI nor the config sets one.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Program arguments loaded from the CLI and config file.
#[derive(Debug, Clone)]
pub struct Args {
    pub flash: PathBuf,
    pub command: Command,
}

#[derive(Debug, Clone)]
pub enum Command {
    /// Create an erased dump with the default boot configuration.
    Init { size: u32 },
    /// Print the boot configuration and slot states.
    Info { toml: bool },
    /// Verify a single image.
    Verify { target: Target },
    /// Print the SHA-256 of a verified slot image.
    Digest { slot: u8 },
    /// Write an image file into a slot.
    Write {
        slot: u8,
        input: PathBuf,
        chunk_size: usize,
    },
    /// Persist the current rom.
    SetRom { slot: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Slot(u8),
    Offset(u32),
}

pub fn args<I, T>(args: I) -> Result<Args, Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Args::try_parse_from(args).map_err(Error::Cli)?;

    // Load the config.
    let config = cli.config.map(|c| config::Config::load(&c)).transpose()?;
    let config_flash = config.as_ref().and_then(|config| config.flash.clone());
    let config_chunk_size = config.as_ref().and_then(|config| config.chunk_size);

    // Reconcile the CLI and config arguments. Error if anything is specified both
    // on the CLI and in the config file.
    let flash = match (cli.flash, config_flash) {
        (None, None) => return Err(Error::FlashMissing),
        (None, Some(flash)) => flash,
        (Some(flash), None) => flash,
        (Some(_), Some(_)) => return Err(Error::FlashInConfigAndCli),
    };

    let command = match cli.command {
        cli::Command::Init { size } => {
            let size = parse_number(&size)?;
            if size % slotboot::consts::SECTOR_SIZE != 0
                || size < slotboot::consts::SECTOR_SIZE * 4
            {
                return Err(Error::InvalidSize(size));
            }
            Command::Init { size }
        }
        cli::Command::Info { toml } => Command::Info { toml },
        cli::Command::Verify { slot, offset } => {
            let target = match (slot, offset) {
                (Some(slot), None) => Target::Slot(slot),
                (None, Some(offset)) => Target::Offset(parse_number(&offset)?),
                (Some(_), Some(_)) => return Err(Error::SlotAndOffsetSpecified),
                (None, None) => return Err(Error::SlotOrOffsetMissing),
            };
            Command::Verify { target }
        }
        cli::Command::Digest { slot } => Command::Digest { slot },
        cli::Command::Write {
            slot,
            input,
            chunk_size,
        } => {
            let chunk_size = match (chunk_size, config_chunk_size) {
                (None, None) => DEFAULT_CHUNK_SIZE,
                (None, Some(chunk_size)) => chunk_size,
                (Some(chunk_size), None) => chunk_size,
                (Some(_), Some(_)) => return Err(Error::ChunkSizeInConfigAndCli),
            };
            if chunk_size == 0 {
                return Err(Error::InvalidChunkSize);
            }
            Command::Write {
                slot,
                input,
                chunk_size,
            }
        }
        cli::Command::SetRom { slot } => Command::SetRom { slot },
    };

    Ok(Args { flash, command })
}

/// Parse a decimal or `0x` prefixed hexadecimal number.
fn parse_number(s: &str) -> Result<u32, Error> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| Error::InvalidNumber(s.to_owned()))
}

#[derive(Debug)]
pub enum Error {
    ChunkSizeInConfigAndCli,
    Cli(clap::Error),
    Config(ConfigError),
    FlashInConfigAndCli,
    FlashMissing,
    InvalidChunkSize,
    InvalidNumber(String),
    InvalidSize(u32),
    SlotAndOffsetSpecified,
    SlotOrOffsetMissing,
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ChunkSizeInConfigAndCli => {
                write!(f, "chunk size specified in both config and cli")
            }
            Error::Cli(e) => write!(f, "{}", e.render().ansi()),
            Error::Config(e) => write!(f, "config error: {e}"),
            Error::FlashInConfigAndCli => write!(f, "flash specified in both config and cli"),
            Error::FlashMissing => write!(
                f,
                "flash dump must be specified, either with --flash (-f) or in the config file"
            ),
            Error::InvalidChunkSize => write!(f, "chunk size must not be zero"),
            Error::InvalidNumber(s) => write!(f, r#"user specified invalid number: "{s}""#),
            Error::InvalidSize(size) => write!(
                f,
                "flash size {size:#x} must be a multiple of {:#x} and at least four sectors",
                slotboot::consts::SECTOR_SIZE
            ),
            Error::SlotAndOffsetSpecified => write!(f, "cannot specify both --slot and --offset"),
            Error::SlotOrOffsetMissing => write!(f, "either --slot or --offset must be specified"),
        }
    }
}

impl std::error::Error for Error {}
