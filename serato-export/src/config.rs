//! Conversion configuration

use std::path::PathBuf;

use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Rekordbox XML library
    Xml,
    /// Pretty-printed library model
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Serato directory (`_Serato_`), must contain `Subcrates`
    pub serato_dir: PathBuf,
    /// Relative crate paths are resolved against this
    pub library_root: PathBuf,
    /// Output file, stdout when unset
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
    /// Max concurrent per-track extractions
    pub max_concurrent: usize,
    /// Per-file extraction timeout
    pub timeout_secs: u64,
    /// Emit a memory cue next to every hot cue
    pub memory_cues: bool,
}
