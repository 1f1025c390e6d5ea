use chunktar::archive::{self, PackOptions, UnpackOptions};
use chunktar::io_stream::DEFAULT_BLOCK_SIZE;
use chunktar::recovery::{self, RecoveryQuality};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// A fatal error stopped the run.
const EXIT_FATAL:   u8 = 1;
/// Some sources were skipped or cut short; the container holds the rest.
const EXIT_PARTIAL: u8 = 3;

#[derive(Parser)]
#[command(name = "chunktar", version, about = "Merge files into one container and split them back out")]
struct Cli {
    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Log per-chunk detail
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge files into a container, in the order given
    Pack {
        #[arg(short, long, alias = "out")]
        output: PathBuf,
        /// Bytes of file content per chunk (1-65535)
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE,
              value_parser = clap::value_parser!(u16).range(1..))]
        block_size: u16,
        /// Resolve paths and name entries relative to DIR instead of the current directory
        #[arg(short = 'C', long = "directory", value_name = "DIR")]
        directory: Option<PathBuf>,
        #[arg(required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    /// Recreate the files recorded in a container
    Unpack {
        input: PathBuf,
        /// Extract under DIR instead of the current directory
        #[arg(short = 'C', long = "directory", value_name = "DIR")]
        directory: Option<PathBuf>,
    },
    /// List container entries in stream order
    List {
        input: PathBuf,
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report how much of a container is intact
    Verify {
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run(command: Commands) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, block_size, directory, input } => {
            let base = directory.clone().unwrap_or_else(|| PathBuf::from("."));
            if !input.iter().any(|p| base.join(p).exists()) {
                let listed: Vec<_> = input.iter().map(|p| p.display().to_string()).collect();
                Cli::command()
                    .error(ErrorKind::ValueValidation,
                           format!("pack requires existing input files ({} not found)", listed.join(", ")))
                    .exit();
            }

            let opts = PackOptions { block_size, work_dir: directory };
            let report = archive::archive(&output, &input, &opts)?;
            for entry in &report.packed {
                println!("  packed  {}", entry.name);
            }
            println!("Created: {}", report.container.display());
            if !report.partial.is_empty() {
                println!("Partially archived {} of {} input(s)", report.partial.len(), input.len());
            }
            if !report.skipped.is_empty() {
                println!("Skipped {} of {} input(s)", report.skipped.len(), input.len());
            }
            if !report.is_complete() {
                return Ok(ExitCode::from(EXIT_PARTIAL));
            }
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, directory } => {
            let opts = UnpackOptions { dest_dir: directory };
            let report = archive::extract(&input, &opts)?;
            for file in &report.files {
                println!("  unpacked  {}", file.path.display());
            }
            println!("Unpacked {} file(s) from {}", report.files.len(), input.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let index = archive::list(&input)?;
            if json {
                println!("{}", String::from_utf8(index.to_bytes()?)?);
                return Ok(ExitCode::SUCCESS);
            }
            println!("Container: {}", input.display());
            println!("{:<32} {:>12} {:>7}  BLAKE3", "Name", "Size", "Chunks");
            for e in &index.entries {
                println!("{:<32} {:>12} {:>7}  {}", e.name, e.size, e.chunks, short_digest(&e.digest));
            }
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { input } => {
            let report = recovery::scan_file(&input)?;
            print_verify(&input, &report);
            if report.quality != RecoveryQuality::Intact {
                return Ok(ExitCode::from(EXIT_FATAL));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_tracing(quiet: bool, verbose: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (_, true) => "debug",
        _         => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn short_digest(hex: &str) -> &str {
    hex.get(..12).unwrap_or(hex)
}

fn print_verify(input: &Path, report: &recovery::RecoveryReport) {
    println!("Container: {}", input.display());
    println!("  {}", report.summary());
    for e in report.intact_entries() {
        println!("  ok       {}", e.name);
    }
    if let Some(name) = report.suspect_entry() {
        println!("  suspect  {name}");
    }
    if let Some(d) = &report.damage {
        println!("  damage at offset {}: {}", d.offset, d.reason);
    }
}
