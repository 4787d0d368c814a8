use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use eyre::eyre;
use log::LevelFilter;
use structopt::StructOpt;

use rompatch::engine::{self, ApplyOutcome, ChecksumStatus, EngineConfig, Verbosity};
use rompatch::error::PatchError;

/// rompatch: IPS/UPS patch tool
///
/// Applies a binary patch to a ROM image in place. The two file arguments
/// may be given in either order; the patch is recognized by its contents.
#[derive(StructOpt, Debug)]
#[structopt(name = "rompatch")]
struct Opt {
    /// Verbose output (-v for a summary, -vv for per-record detail)
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,

    /// Apply a UPS patch even if the source image fails its size or
    /// checksum check
    #[structopt(long)]
    force: bool,

    /// Patch file (or the ROM, if the other argument is the patch)
    #[structopt(name = "PATCH", parse(from_os_str))]
    first: PathBuf,

    /// ROM image to patch in place
    #[structopt(name = "ROM", parse(from_os_str))]
    second: PathBuf,
}

fn main() {
    let args = Opt::from_args();

    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        })
        .format_timestamp(None)
        .init();

    match run(&args) {
        Ok(()) => (),
        Err(e) => {
            use std::io::Write;
            let stderr = std::io::stderr();
            let _ = writeln!(&mut stderr.lock(), "{e}");
            std::process::exit(1);
        }
    }
}

fn run(args: &Opt) -> eyre::Result<()> {
    let config = EngineConfig {
        verbosity: match args.verbose {
            0 => Verbosity::Quiet,
            1 => Verbosity::Summary,
            _ => Verbosity::Records,
        },
        force: args.force,
    };

    // Try the first file as the patch; if neither magic matches, the user
    // probably passed the files the other way around.
    let outcome = match try_apply(&args.first, &args.second, &config) {
        Err(PatchError::FormatUnrecognized) => {
            match try_apply(&args.second, &args.first, &config) {
                Err(PatchError::FormatUnrecognized) => {
                    return Err(eyre!(
                        "neither {} nor {} looks like an IPS or UPS patch",
                        args.first.display(),
                        args.second.display()
                    ));
                }
                result => result?,
            }
        }
        result => result?,
    };

    report(args, &outcome);
    Ok(())
}

fn try_apply(
    patch_path: &Path,
    rom_path: &Path,
    config: &EngineConfig,
) -> Result<ApplyOutcome, PatchError> {
    let mut patch = File::open(patch_path)?;
    let mut rom = OpenOptions::new().read(true).write(true).open(rom_path)?;
    let hint = patch_path.file_name().and_then(|name| name.to_str());
    engine::apply(&mut patch, &mut rom, hint, config)
}

fn report(args: &Opt, outcome: &ApplyOutcome) {
    if args.verbose >= 2 {
        for notice in &outcome.notices {
            println!(
                "applied record: offset {}, {} bytes",
                notice.offset, notice.len
            );
        }
    }
    if args.verbose >= 1 {
        println!(
            "applied {} {} records",
            outcome.records_applied, outcome.format
        );
        match outcome.output_check {
            Some(ChecksumStatus::Matched) => println!("patched image checksum verified"),
            Some(ChecksumStatus::Mismatched { expected, actual }) => eprintln!(
                "warning: patched image checksum {actual:08x} does not match recorded {expected:08x}"
            ),
            None => (),
        }
    }
}
