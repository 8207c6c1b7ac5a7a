//! serato-core: Serato DJ library structures
//!
//! This crate decodes:
//! - crate files (`Subcrates/*.crate`) - length-prefixed UTF-16BE tag streams
//! - Serato Markers2 cue data nested in ID3 GEOB frames or FLAC Vorbis comments
//!
//! and merges them into a format-neutral library model with stable track keys.
//! Reading audio tags is left to the caller (see [`library::TrackSource`]).

pub mod reader;
pub mod tag;
pub mod string;
pub mod crate_file;
pub mod markers;
pub mod container;
pub mod track;
pub mod library;
pub mod validate;
pub mod error;

pub use container::{EncapsulatedObject, NativeFrames};
pub use crate_file::{decode_crate, encode_crate, read_crate_file, Crate};
pub use error::{Error, Result};
pub use library::{Library, LibraryBuilder, PendingTrack, TrackSource};
pub use markers::{decode_markers, MarkerEntry};
pub use track::{Cue, FileType, Playlist, Rgb, TrackMetadata, TrackRecord};
