//! bambu2prusa: convert Bambu Studio paint annotations for PrusaSlicer.
//!
//! # Logging
//!
//! Diagnostics go to stderr. Use `-v`/`-vv`/`-vvv` or set `RUST_LOG` to
//! control them:
//!
//! ```bash
//! RUST_LOG=bambu2prusa=debug bambu2prusa painted.3mf
//! ```

use anyhow::{Context, Result};
use bambu2prusa::{ConvertOptions, convert_file_with_options, default_output_path};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Convert Bambu Studio / OrcaSlicer paint annotations to the
/// PrusaSlicer encoding.
///
/// Rewrites `paint_color`, `paint_seam` and `paint_supports` triangle
/// attributes into their `slic3rpe` equivalents and leaves everything
/// else in the package byte-for-byte unchanged.
#[derive(Parser)]
#[command(name = "bambu2prusa")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input 3mf file painted with Bambu Studio or OrcaSlicer
    input: PathBuf,

    /// Output 3mf file (default: <input>-prusa.3mf)
    output: Option<PathBuf>,

    /// Suppress all non-error output
    #[arg(long, short)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over the -v flags when set.
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "bambu2prusa=info",
            2 => "bambu2prusa=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input));

    let report = convert_file_with_options(&cli.input, &output, &ConvertOptions::default())
        .with_context(|| format!("failed to convert '{}'", cli.input.display()))?;

    if !cli.quiet {
        println!("{}: {report}", output.display());
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        for cause in e.chain().skip(1) {
            eprintln!("  Caused by: {cause}");
        }
        std::process::exit(1);
    }
}
