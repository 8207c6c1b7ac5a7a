//! Library model types
//!
//! These are the format-neutral representations handed from the decoders to
//! the emitters. Everything is built once per conversion run.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Audio file type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FileType {
    Mp3,
    Wav,
    Flac,
}

impl FileType {
    /// `None` for anything we cannot pull markers from
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(FileType::Mp3),
            "wav" => Some(FileType::Wav),
            "flac" => Some(FileType::Flac),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Rekordbox "Kind" column
    pub fn kind(&self) -> &'static str {
        match self {
            FileType::Mp3 => "MP3 File",
            FileType::Wav => "WAV File",
            FileType::Flac => "FLAC File",
        }
    }
}

/// 24-bit colour as stored in marker entries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2])
    }

    /// Lowercase hex, e.g. `cc0000`
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

/// Hot cue decoded from a Serato Markers2 `CUE` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cue {
    /// Hot cue slot, 0-based
    pub index: u8,
    /// Position from track start in milliseconds
    pub position_ms: u32,
    pub color: Rgb,
    pub label: Option<String>,
}

impl Cue {
    pub fn position_secs(&self) -> f64 {
        f64::from(self.position_ms) / 1000.0
    }
}

/// Common audio metadata supplied by the tag reader
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub bpm: Option<f64>,
    /// Tonality as written in the tag (e.g. "Am", "8A")
    pub key: Option<String>,
    pub comment: Option<String>,
    /// Sample rate in Hz
    pub sample_rate: Option<u32>,
    /// Bitrate in kbps
    pub bitrate: Option<u32>,
    pub duration_secs: Option<f64>,
    /// File size in bytes (from stat, not from the tags)
    pub file_size: u64,
    pub file_type: Option<FileType>,
}

/// Everything the emitter needs about one track
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TrackRecord {
    pub metadata: TrackMetadata,
    pub cue_points: Vec<Cue>,
}

/// Named, ordered list of track paths
///
/// Paths are kept exactly as the source wrote them; resolution happens when
/// the library is built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Playlist {
    pub name: String,
    pub tracks: Vec<String>,
}

impl Playlist {
    pub fn new(name: impl Into<String>, tracks: Vec<String>) -> Self {
        Self {
            name: name.into(),
            tracks,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
