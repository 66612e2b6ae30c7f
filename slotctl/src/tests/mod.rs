use {
    self::image::create_file,
    crate::ExitCode,
    sha2::Digest,
    std::path::{Path, PathBuf},
};


const SIZE: &str = "0x40000";

/// Create a fresh dump in a temporary directory.
fn init() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let flash = dir.path().join("flash.bin");
    let output = test(["init", "-f", path(&flash), "--size", SIZE]);
    assert_eq!(output.exit_code, ExitCode(0));
    (dir, flash)
}

/// Initialize a dump with the default layout.
#[test]
fn init_writes_default_layout() {
    let (_dir, flash) = init();
    assert_eq!(std::fs::metadata(&flash).unwrap().len(), 0x40000);

    let output = test(["info", "-f", path(&flash)]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("0x002000"));
    assert!(output.stdout.contains("0x022000"));
    // Both slots are still erased.
    assert_eq!(output.stdout.matches("bad magic").count(), 2);
    assert!(output.stderr.is_empty());
}

/// Sizes that cannot hold a sector-aligned layout are refused.
#[test]
fn init_invalid_size() {
    let dir = tempfile::tempdir().unwrap();
    let flash = dir.path().join("flash.bin");

    let output = test(["init", "-f", path(&flash), "--size", "0x1234"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("0x1234"));

    let output = test(["init", "-f", path(&flash), "--size", "lots"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("invalid number"));
    assert!(!flash.exists());
}

/// Print the configuration as TOML.
#[test]
fn info_toml() {
    let (_dir, flash) = init();
    let output = test(["info", "-f", path(&flash), "--toml"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("current_rom = 0"));
    assert!(output.stdout.contains("count = 2"));
    assert!(output.stdout.contains("8192"));
    assert!(output.stdout.contains("139264"));
}

/// Write an image in odd sized chunks, then verify and digest it.
#[test]
fn write_verify_digest() {
    let (_dir, flash) = init();
    let image = image::image(5000);
    let input = create_file(&image);

    let output = test([
        "write",
        "-f",
        path(&flash),
        "--slot",
        "1",
        "-i",
        path(input.path()),
        "--chunk-size",
        "333",
    ]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("slot 1 at 0x22000"));
    assert!(output.stdout.contains(&format!("({})", image.len())));

    let dump = std::fs::read(&flash).unwrap();
    assert_eq!(&dump[0x22000..0x22000 + image.len()], image.as_slice());

    let output = test(["verify", "-f", path(&flash), "--slot", "1"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("valid"));
    assert!(output.stdout.contains("0x40100004"));

    let output = test(["verify", "-f", path(&flash), "--offset", "0x22000"]);
    assert_eq!(output.exit_code, ExitCode(0));

    let output = test(["digest", "-f", path(&flash), "--slot", "1"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output
        .stdout
        .contains(&hex::encode(sha2::Sha256::digest(&image))));
}

/// An erased slot fails verification with a diagnostic.
#[test]
fn verify_empty_slot() {
    let (_dir, flash) = init();
    let output = test(["verify", "-f", path(&flash), "--slot", "0"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stdout.is_empty());
    assert!(output.stderr.contains("invalid image at 0x2000: bad magic"));

    let output = test(["digest", "-f", path(&flash), "--slot", "0"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("bad magic"));
}

/// A corrupted image is written but reported.
#[test]
fn write_corrupted_image() {
    let (_dir, flash) = init();
    let mut image = image::image(100);
    let last = image.len() - 1;
    image[last] ^= 0xFF;
    let input = create_file(&image);

    let output = test([
        "write",
        "-f",
        path(&flash),
        "--slot",
        "0",
        "-i",
        path(input.path()),
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("checksum mismatch"));
}

/// Images larger than their slot are refused before touching the dump.
#[test]
fn write_too_large() {
    let (_dir, flash) = init();
    let before = std::fs::read(&flash).unwrap();
    let input = create_file(&image::image(0x21000));

    let output = test([
        "write",
        "-f",
        path(&flash),
        "--slot",
        "0",
        "-i",
        path(input.path()),
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("does not fit"));
    assert_eq!(std::fs::read(&flash).unwrap(), before);
}

/// A slot table pointing past the end of the dump is reported, not trusted.
#[test]
fn slot_past_end_of_dump() {
    let (_dir, flash) = init();
    let mut dump = std::fs::read(&flash).unwrap();
    // Offset of slot 1 in the configuration sector.
    dump[0x100C..0x1010].copy_from_slice(&0x10_0000u32.to_le_bytes());
    std::fs::write(&flash, &dump).unwrap();
    let input = create_file(&image::image(64));

    let output = test([
        "write",
        "-f",
        path(&flash),
        "--slot",
        "1",
        "-i",
        path(input.path()),
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("invalid boot configuration"));
    assert_eq!(std::fs::read(&flash).unwrap(), dump);
}

/// Persist the current rom.
#[test]
fn set_rom() {
    let (_dir, flash) = init();
    let output = test(["set-rom", "-f", path(&flash), "--slot", "1"]);
    assert_eq!(output.exit_code, ExitCode(0));

    let output = test(["info", "-f", path(&flash), "--toml"]);
    assert!(output.stdout.contains("current_rom = 1"));

    let output = test(["set-rom", "-f", path(&flash), "--slot", "2"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("slot 2 is not configured"));
}

/// Take the flash dump path and chunk size from the config file.
#[test]
fn config_file() {
    let (_dir, flash) = init();
    let config = create_file(
        format!("flash = {:?}\nchunk_size = 7\n", path(&flash)).as_bytes(),
    );
    let input = create_file(&image::image(64));

    let output = test([
        "write",
        "-c",
        path(config.path()),
        "--slot",
        "0",
        "-i",
        path(input.path()),
    ]);
    assert_eq!(output.exit_code, ExitCode(0));

    let output = test(["verify", "-c", path(config.path()), "--slot", "0"]);
    assert_eq!(output.exit_code, ExitCode(0));
}

/// Values may not be given both in the config file and on the command line.
#[test]
fn config_and_cli_conflict() {
    let (_dir, flash) = init();
    let config = create_file(
        format!("flash = {:?}\nchunk_size = 7\n", path(&flash)).as_bytes(),
    );
    let output = test([
        "info",
        "-c",
        path(config.path()),
        "-f",
        path(&flash),
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("flash specified in both config and cli"));

    let only_chunk = create_file(b"chunk_size = 7\n");
    let input = create_file(&image::image(64));
    let output = test([
        "write",
        "-c",
        path(only_chunk.path()),
        "-f",
        path(&flash),
        "--slot",
        "0",
        "-i",
        path(input.path()),
        "--chunk-size",
        "8",
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output
        .stderr
        .contains("chunk size specified in both config and cli"));
}

/// Malformed config files are reported.
#[test]
fn config_invalid() {
    let config = create_file(b"flash = 12\n");
    let output = test(["info", "-c", path(config.path())]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("config file format error in TOML"));
}

/// Missing or unusable arguments.
#[test]
fn bad_arguments() {
    let output = test(["info"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("flash dump must be specified"));

    let (_dir, flash) = init();
    let output = test(["verify", "-f", path(&flash)]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output
        .stderr
        .contains("either --slot or --offset must be specified"));

    let output = test([
        "verify", "-f", path(&flash), "--slot", "0", "--offset", "0x2000",
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("cannot specify both"));

    let output = test(["info", "-f", "/nonexistent/flash.bin"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("failed to read flash dump"));

    let output = test(["frobnicate"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(!output.stderr.is_empty());
}

/// A dump without a boot configuration.
#[test]
fn blank_dump_has_no_config() {
    let blank = create_file(&vec![0xFF; 0x10000]);
    let output = test(["info", "-f", path(blank.path())]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("no boot configuration found"));
}

fn path(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn test<const N: usize>(args: [&str; N]) -> Output {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = crate::main_args(
        std::iter::once("slotctl").chain(args),
        &mut stdout,
        &mut stderr,
    );
    println!("* args: {:?}", args);
    println!("* exit_code: {:?}", exit_code);
    println!("* stdout:\n{}", String::from_utf8_lossy(&stdout));
    println!("* stderr:\n{}", String::from_utf8_lossy(&stderr));
    Output {
        exit_code,
        stdout: String::from_utf8(stdout).unwrap(),
        stderr: String::from_utf8(stderr).unwrap(),
    }
}

#[derive(Debug)]
struct Output {
    exit_code: ExitCode,
    stdout: String,
    stderr: String,
}
