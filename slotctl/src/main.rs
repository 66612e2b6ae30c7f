use {
    colored::Colorize,
    embedded_storage::nor_flash::ReadNorFlash,
    sha2::Digest,
    slotboot::{BootConfig, ConfigMode, ImageError, ImageInfo, WriteSession},
    std::{ffi::OsString, io::Write},
};

mod args;
mod flash;

#[cfg(test)]
mod tests;

use flash::DumpFlash;

fn main() -> std::process::ExitCode {
    main_args(
        std::env::args_os(),
        &mut std::io::stdout(),
        &mut std::io::stderr(),
    )
    .into()
}

fn main_args<I, T>(args: I, stdout: impl Write, mut stderr: impl Write) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match run(args, stdout) {
        Ok(()) => ExitCode(0),
        Err(Error::Args(e @ args::Error::Cli(_))) => {
            // Clap already does the "error: {}" formatting.
            writeln!(stderr, "{e}").expect("write error to stderr");
            ExitCode(1)
        }
        Err(e) => {
            writeln!(stderr, "{} {e}", "error:".bold().red()).expect("write error to stderr");
            ExitCode(1)
        }
    }
}

fn run<I, T>(args: I, mut stdout: impl Write) -> Result<(), Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args::Args {
        flash: path,
        command,
    } = args::args(args)?;
    match command {
        args::Command::Init { size } => {
            let mut flash = DumpFlash::erased(size);
            slotboot::set_config(&mut flash, &BootConfig::default_layout(size))?;
            flash.save(&path)?;
            writeln!(
                &mut stdout,
                "{} {} ({})",
                "created".bold(),
                path.display(),
                humansize::format_size(size, humansize::BINARY),
            )
            .map_err(Error::Stdout)?;
        }
        args::Command::Info { toml: as_toml } => {
            let mut flash = DumpFlash::open(&path)?;
            let config = slotboot::get_config(&mut flash)?;
            if as_toml {
                let text = toml::to_string(&config).map_err(Error::Toml)?;
                write!(&mut stdout, "{text}").map_err(Error::Stdout)?;
                return Ok(());
            }

            writeln!(&mut stdout, "{:12} {}", "mode".bold(), mode_names(config.mode))
                .map_err(Error::Stdout)?;
            writeln!(&mut stdout, "{:12} {}", "current rom".bold(), config.current_rom)
                .map_err(Error::Stdout)?;
            writeln!(&mut stdout, "{:12} {}", "gpio rom".bold(), config.gpio_rom)
                .map_err(Error::Stdout)?;
            for (slot, &offset) in config.slots().iter().enumerate() {
                let slot = slot as u8;
                let status = match slotboot::verify_slot(&mut flash, &config, slot) {
                    Ok(info) => format!(
                        "valid, {}",
                        humansize::format_size(info.length, humansize::BINARY)
                    )
                    .green(),
                    Err(slotboot::Error::Image(e)) => e.message().yellow(),
                    Err(e) => return Err(e.into()),
                };
                writeln!(
                    &mut stdout,
                    "{:12} {offset:#08x} {status}",
                    format!("slot {slot}").bold(),
                )
                .map_err(Error::Stdout)?;
            }
        }
        args::Command::Verify { target } => {
            let mut flash = DumpFlash::open(&path)?;
            let (offset, result) = match target {
                args::Target::Slot(slot) => {
                    let config = slotboot::get_config(&mut flash)?;
                    let offset = slot_offset(&config, slot)?;
                    (offset, slotboot::verify_slot(&mut flash, &config, slot))
                }
                args::Target::Offset(offset) => (
                    offset,
                    slotboot::verify_image(&mut flash, offset).map_err(Into::into),
                ),
            };
            let info = image_result(result, offset)?;
            print_image(&mut stdout, offset, &info)?;
        }
        args::Command::Digest { slot } => {
            let mut flash = DumpFlash::open(&path)?;
            let config = slotboot::get_config(&mut flash)?;
            let offset = slot_offset(&config, slot)?;
            let mut sha = sha2::Sha256::new();
            let info = image_result(
                slotboot::digest_slot(&mut flash, &config, slot, &mut sha),
                offset,
            )?;
            writeln!(
                &mut stdout,
                "{:10} {}",
                "sha256".bold(),
                hex::encode(sha.finalize()),
            )
            .map_err(Error::Stdout)?;
            writeln!(&mut stdout, "{:10} {}", "length".bold(), info.length)
                .map_err(Error::Stdout)?;
        }
        args::Command::Write {
            slot,
            input,
            chunk_size,
        } => {
            let image = std::fs::read(input).map_err(Error::ReadInputFile)?;
            let mut flash = DumpFlash::open(&path)?;
            let config = slotboot::get_config(&mut flash)?;
            let offset = slot_offset(&config, slot)?;

            // The image may not spill into the following slot.
            let capacity = flash.capacity() as u32;
            let end = config
                .slots()
                .iter()
                .copied()
                .filter(|&o| o > offset)
                .min()
                .unwrap_or(capacity);
            let room = end
                .checked_sub(offset)
                .ok_or(Error::Boot(slotboot::Error::InvalidSlot(slot)))?;
            if image.len() > room as usize {
                return Err(Error::ImageTooLarge {
                    len: image.len(),
                    room,
                });
            }

            let mut session = WriteSession::begin(offset);
            for chunk in image.chunks(chunk_size) {
                session.append(&mut flash, chunk)?;
            }
            session.flush(&mut flash)?;
            flash.save(&path)?;
            writeln!(
                &mut stdout,
                "{} {} to slot {slot} at {offset:#x}",
                "wrote".bold(),
                humansize::format_size(session.bytes_written(), humansize::BINARY),
            )
            .map_err(Error::Stdout)?;

            let info = image_result(slotboot::verify_slot(&mut flash, &config, slot), offset)?;
            print_image(&mut stdout, offset, &info)?;
        }
        args::Command::SetRom { slot } => {
            let mut flash = DumpFlash::open(&path)?;
            slotboot::set_current_rom(&mut flash, slot)?;
            flash.save(&path)?;
            writeln!(&mut stdout, "{} {slot}", "current rom".bold()).map_err(Error::Stdout)?;
        }
    }
    Ok(())
}

fn slot_offset(config: &BootConfig, slot: u8) -> Result<u32, Error> {
    config
        .slot_offset(slot)
        .ok_or(Error::Boot(slotboot::Error::InvalidSlot(slot)))
}

/// Turn an image verification failure into a reportable error.
fn image_result(result: slotboot::Result<ImageInfo>, offset: u32) -> Result<ImageInfo, Error> {
    result.map_err(|e| match e {
        slotboot::Error::Image(error) => Error::InvalidImage { offset, error },
        e => Error::Boot(e),
    })
}

fn print_image(mut stdout: impl Write, offset: u32, info: &ImageInfo) -> Result<(), Error> {
    writeln!(
        &mut stdout,
        "{:10} {} at {offset:#x}",
        "image".bold(),
        "valid".green(),
    )
    .map_err(Error::Stdout)?;
    writeln!(
        &mut stdout,
        "{:10} {} ({})",
        "length".bold(),
        humansize::format_size(info.length, humansize::BINARY),
        info.length,
    )
    .map_err(Error::Stdout)?;
    writeln!(&mut stdout, "{:10} {:#010x}", "entry".bold(), info.entry).map_err(Error::Stdout)?;
    writeln!(
        &mut stdout,
        "{:10} {}{}",
        "segments".bold(),
        info.segments,
        if info.irom { " + irom" } else { "" },
    )
    .map_err(Error::Stdout)
}

fn mode_names(mode: ConfigMode) -> String {
    let names: Vec<_> = mode
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect();
    if names.is_empty() {
        "standard".to_owned()
    } else {
        names.join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExitCode(u8);

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        code.0.into()
    }
}

#[derive(Debug)]
enum Error {
    Args(args::Error),
    Boot(slotboot::Error),
    Flash(flash::Error),
    ImageTooLarge { len: usize, room: u32 },
    InvalidImage { offset: u32, error: ImageError },
    ReadInputFile(std::io::Error),
    Stdout(std::io::Error),
    Toml(toml::ser::Error),
}

impl From<args::Error> for Error {
    fn from(e: args::Error) -> Self {
        Error::Args(e)
    }
}

impl From<slotboot::Error> for Error {
    fn from(e: slotboot::Error) -> Self {
        Error::Boot(e)
    }
}

impl From<flash::Error> for Error {
    fn from(e: flash::Error) -> Self {
        Error::Flash(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Args(e) => write!(f, "{e}"),
            Error::Boot(e) => write!(f, "{e}"),
            Error::Flash(e) => write!(f, "{e}"),
            Error::ImageTooLarge { len, room } => write!(
                f,
                "image of {len} bytes does not fit in the {room} bytes before the next slot"
            ),
            Error::InvalidImage { offset, error } => {
                write!(f, "invalid image at {offset:#x}: {}", error.message())
            }
            Error::ReadInputFile(e) => write!(f, "failed to read input file: {e}"),
            Error::Stdout(e) => write!(f, "failed to write to stdout: {e}"),
            Error::Toml(e) => write!(f, "failed to format config as TOML: {e}"),
        }
    }
}

impl std::error::Error for Error {}
