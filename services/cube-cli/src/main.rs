//! Flag-band inspection tool for Zarr data cubes.
//!
//! Decodes flag values against flag-band descriptors, validates descriptors
//! against the flag-coding registry, and inspects cube stores: structure,
//! cube conventions, flag bands and per-flag pixel counts.

mod commands;
mod config;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::{Outcome, Runner};
use config::{CliConfig, LogFormat, OutputFormat};

/// Exit code for runtime errors.
const EXIT_ERROR: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "cubeflags")]
#[command(version, about = "Inspect flag bands of Zarr data cubes")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "CUBEFLAGS_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Result output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the flags set in each value
    Decode {
        /// Flag-band descriptor (JSON attributes file)
        descriptor: PathBuf,

        /// Pixel values, decimal or 0x-prefixed hex
        #[arg(required = true, allow_negative_numbers = true)]
        values: Vec<String>,
    },

    /// Print the value that sets exactly the given flags
    Encode {
        /// Flag-band descriptor (JSON attributes file)
        descriptor: PathBuf,

        /// Flag meanings
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Print the flag table of a descriptor
    Flags {
        /// Flag-band descriptor (JSON attributes file)
        descriptor: PathBuf,
    },

    /// Validate a descriptor and compare it with the registry
    Validate {
        /// Flag-band descriptor (JSON attributes file)
        descriptor: PathBuf,
    },

    /// Print the dataset descriptor of a cube as JSON
    Describe {
        /// Zarr store directory
        cube: PathBuf,
    },

    /// Print a text summary of a cube
    Dump {
        /// Zarr store directory
        cube: PathBuf,
    },

    /// Check a cube against the cube conventions
    Verify {
        /// Zarr store directory
        cube: PathBuf,
    },

    /// List and validate the flag bands of a cube
    Bands {
        /// Zarr store directory
        cube: PathBuf,
    },

    /// Count pixels per flag in a flag band
    Stats {
        /// Zarr store directory
        cube: PathBuf,

        /// Flag band variable
        variable: String,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn run(args: Args) -> Result<Outcome> {
    let mut config = CliConfig::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
    if let Some(format) = args.output {
        config.output.format = format;
    }
    config.validate()?;

    init_tracing(&config)?;
    info!(command = ?args.command, "Starting cubeflags");

    let mut runner = Runner::new(&config, io::stdout().lock())?;
    match args.command {
        Command::Decode { descriptor, values } => runner.decode(&descriptor, &values),
        Command::Encode { descriptor, names } => runner.encode(&descriptor, &names),
        Command::Flags { descriptor } => runner.flags(&descriptor),
        Command::Validate { descriptor } => runner.validate(&descriptor),
        Command::Describe { cube } => runner.describe(&cube),
        Command::Dump { cube } => runner.dump(&cube),
        Command::Verify { cube } => runner.verify(&cube),
        Command::Bands { cube } => runner.bands(&cube),
        Command::Stats { cube, variable } => runner.stats(&cube, &variable),
    }
}

/// Install the global subscriber. Logs go to stderr; stdout carries results.
fn init_tracing(config: &CliConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.logging.level.to_lowercase())?;
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true);

    match config.logging.format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(builder.json().finish())?;
        }
        LogFormat::Pretty => {
            tracing::subscriber::set_global_default(builder.finish())?;
        }
    }
    Ok(())
}
