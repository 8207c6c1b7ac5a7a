//! Serato to Rekordbox library converter
//!
//! Reads the crates of a Serato library, pulls metadata and hot cues from the
//! referenced audio files, and writes a Rekordbox XML (or JSON) library.

mod analyzer;
mod config;
mod export;

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use serato_core::library::load_playlists;
use serato_core::validate::validate_and_print;
use serato_core::LibraryBuilder;

use config::{Config, OutputFormat};
use export::XmlOptions;

#[derive(Parser)]
#[command(name = "serato-export")]
#[command(about = "Convert Serato crates and cue points to a Rekordbox library")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a Serato library
    Convert {
        /// Serato directory (the one containing Subcrates)
        #[arg(short, long, default_value = "_Serato_")]
        serato_dir: PathBuf,

        /// Root that relative crate paths are resolved against
        #[arg(short, long, default_value = "/")]
        library_root: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "xml")]
        format: OutputFormat,

        /// Maximum concurrent track extractions
        #[arg(long, default_value = "2")]
        max_concurrent: usize,

        /// Give up on a file after this many seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,

        /// Also write every hot cue as a memory cue
        #[arg(long)]
        memory_cues: bool,
    },

    /// Validate crate files
    Check {
        #[arg(required = true)]
        crates: Vec<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout can carry the library
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Convert {
            serato_dir,
            library_root,
            output,
            format,
            max_concurrent,
            timeout_secs,
            memory_cues,
        } => {
            if max_concurrent == 0 {
                anyhow::bail!("--max-concurrent must be at least 1");
            }
            let config = Config {
                serato_dir,
                library_root,
                output,
                format,
                max_concurrent,
                timeout_secs,
                memory_cues,
            };
            convert(&config).await
        }
        Command::Check { crates } => check(&crates),
    }
}

async fn convert(config: &Config) -> anyhow::Result<()> {
    info!("Serato directory: {:?}", config.serato_dir);
    info!("Library root: {:?}", config.library_root);

    let playlists = load_playlists(&config.serato_dir)?;
    info!("Loaded {} crates", playlists.len());

    // Every track goes through the bounded, timed extraction
    let mut builder = LibraryBuilder::new(&config.library_root);
    let pending = builder.plan(&playlists);
    info!("Extracting {} tracks", pending.len());
    let loaded = analyzer::extract_tracks(&mut builder, pending, config).await;
    info!("Loaded {} tracks, skipped {} paths", loaded, builder.skipped());
    builder.extend_playlists(playlists);
    let library = builder.build();

    let mut out: Box<dyn Write> = match &config.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    match config.format {
        OutputFormat::Xml => {
            let options = XmlOptions {
                memory_cues: config.memory_cues,
            };
            export::write_rekordbox_xml(&library, options, &mut out)?;
        }
        OutputFormat::Json => export::write_json(&library, &mut out)?,
    }
    out.flush()?;

    if let Some(path) = &config.output {
        info!("Wrote {:?}", path);
    }
    Ok(())
}

fn check(crates: &[PathBuf]) -> anyhow::Result<()> {
    let mut invalid = 0;
    for path in crates {
        let data = fs::read(path)?;
        if !validate_and_print(&path.display().to_string(), &data) {
            invalid += 1;
        }
    }
    if invalid > 0 {
        anyhow::bail!("{} of {} crates invalid", invalid, crates.len());
    }
    Ok(())
}
