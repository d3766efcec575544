//! LiveID CLI - Liveness-gated face identification kiosk.

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use liveid_core::LiveIdConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success (access granted, identity enrolled)
  64  Usage error
  65  Access denied (spoof detected or no matching identity)
  66  Input error (unreadable frame or frame directory)
  69  Service unavailable (liveness classifier or embedding failure)
  74  I/O error (gallery could not be read or written)";

#[derive(Parser)]
#[command(name = "liveid")]
#[command(author, version, about = "Liveness-gated face identification", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Gallery snapshot file [env: LIVEID_GALLERY] [default: liveid-gallery.json]
    #[arg(long, global = true, value_name = "PATH")]
    gallery: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// When to use colors
    #[arg(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
    color: ColorMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

/// Scripted liveness verdict used instead of a remote classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MockLiveness {
    /// Real person, high confidence
    Live,
    /// Presentation attack, high confidence
    Spoof,
    /// Classifier outage (the gate fails closed)
    Error,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll an identity from a directory of face frames
    Enroll {
        /// Display name of the person
        #[arg(long)]
        name: String,

        /// External reference (employee ID, badge number); must be unique
        #[arg(long)]
        external_ref: String,

        /// Directory of image files used as the camera feed
        #[arg(long, value_name = "DIR")]
        frames: PathBuf,

        /// Number of samples to capture [env: CAPTURE_TARGET_SAMPLES] [default: 20]
        #[arg(long)]
        target: Option<usize>,

        /// Capture cadence in milliseconds [env: CAPTURE_INTERVAL_MS] [default: 200]
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Check liveness of a frame and identify the person
    Verify {
        /// Probe image presented to the camera
        #[arg(long, value_name = "FILE")]
        frame: PathBuf,

        /// Use a scripted liveness verdict instead of a remote classifier (for testing)
        #[arg(long, value_enum, value_name = "VERDICT")]
        mock_liveness: Option<MockLiveness>,

        /// Neighbors consulted by the vote [env: MATCH_K] [default: 5]
        #[arg(long)]
        k: Option<usize>,

        /// Maximum accepted embedding distance [env: MATCH_MAX_DISTANCE] [default: 0.6]
        #[arg(long)]
        max_distance: Option<f32>,

        /// Liveness confidence threshold [env: LIVENESS_THRESHOLD] [default: 0.6]
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// List enrolled identities
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show gallery status
    Status,
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    match cli.color {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {}
    }
    init_tracing(cli.verbose, cli.quiet, cli.color != ColorMode::Never);

    if let Err(err) = run(cli).await {
        let exit = ExitCode::from_anyhow(&err);
        if let Some(message) = exit.message {
            eprintln!("{} {}", "error:".red().bold(), message);
        }
        std::process::exit(exit.code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = LiveIdConfig::from_env();
    if let Some(gallery) = cli.gallery {
        config.gallery_path = gallery;
    }
    let quiet = cli.quiet;

    match cli.command {
        Commands::Enroll {
            name,
            external_ref,
            frames,
            target,
            interval_ms,
        } => {
            let args = commands::enroll::EnrollArgs {
                name,
                external_ref,
                frames,
                target,
                interval_ms,
            };
            commands::enroll::execute(config, args, quiet).await
        }
        Commands::Verify {
            frame,
            mock_liveness,
            k,
            max_distance,
            threshold,
        } => {
            let args = commands::verify::VerifyArgs {
                frame,
                mock_liveness,
                k,
                max_distance,
                threshold,
            };
            commands::verify::execute(config, args, quiet).await
        }
        Commands::List { json } => commands::list::execute(&config, json, quiet),
        Commands::Status => commands::status::execute(&config, quiet),
    }
}

fn init_tracing(verbose: u8, quiet: bool, ansi: bool) {
    let default_directive = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "liveid=info,liveid_core=info",
        (false, 1) => "liveid=debug,liveid_core=debug",
        (false, _) => "liveid=trace,liveid_core=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(ansi)
        .init();
}
