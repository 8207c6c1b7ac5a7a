//! Serato crate files (`_Serato_/Subcrates/*.crate`)
//!
//! A crate is a top-level tag stream:
//! - vrsn: format version text
//! - osrt: active sort column (tvcn name + brev reverse flag)
//! - ovct: one per visible column (tvcn name + tvcw width)
//! - otrk: one per track, wrapping a ptrk path
//!
//! All text is UTF-16BE. Tags this table does not name are preserved
//! byte-for-byte so a decoded crate encodes back to the same bytes.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::string::{decode_utf16be, encode_utf16be};
use crate::tag::{decode_all, write_tag, TagId, TagSchema, TagStream};
use crate::track::Playlist;

pub const VERSION_TAG: TagId = TagId::new(b"vrsn");
pub const COLUMN_NAME_TAG: TagId = TagId::new(b"tvcn");
pub const COLUMN_TAG: TagId = TagId::new(b"ovct");
pub const SORT_COLUMN_TAG: TagId = TagId::new(b"osrt");
pub const TRACK_NAME_TAG: TagId = TagId::new(b"ptrk");
pub const TRACK_TAG: TagId = TagId::new(b"otrk");
pub const OPAQUE_CONTAINER_TAG: TagId = TagId::new(b"orvc");

/// Reverse-sort flag inside `osrt`, not part of the type table
const SORT_REVERSE_TAG: TagId = TagId::new(b"brev");

pub const CRATE_EXTENSION: &str = "crate";

/// One decoded crate tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrateTag {
    pub id: TagId,
    pub value: TagValue,
}

/// Interpretation of a crate tag payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    Metadata(String),
    ColumnName(String),
    Column(Vec<CrateTag>),
    TrackName(String),
    Track(Vec<CrateTag>),
    FirstColumn(Vec<CrateTag>),
    /// `orvc`: undocumented; children are read as opaque tags and the
    /// payload is written back exactly as read
    UnknownContainer { raw: Vec<u8>, tags: Vec<CrateTag> },
    Unknown(Vec<u8>),
}

/// Type table for crate files
pub struct CrateSchema;

/// Every id is opaque; used inside `orvc`
struct OpaqueSchema;

impl TagSchema for OpaqueSchema {
    type Tag = CrateTag;

    fn interpret(id: TagId, payload: &[u8]) -> Result<CrateTag> {
        Ok(CrateTag::new(id, TagValue::Unknown(payload.to_vec())))
    }
}

/// Complete records up to the first one that does not fit
fn decode_opaque(payload: &[u8]) -> Vec<CrateTag> {
    TagStream::<OpaqueSchema>::new(payload)
        .map_while(|tag| tag.ok())
        .collect()
}

impl TagSchema for CrateSchema {
    type Tag = CrateTag;

    fn interpret(id: TagId, payload: &[u8]) -> Result<CrateTag> {
        let value = match id.as_bytes() {
            b"vrsn" => TagValue::Metadata(decode_utf16be(payload)?),
            b"tvcn" => TagValue::ColumnName(decode_utf16be(payload)?),
            b"ovct" => TagValue::Column(decode_all::<CrateSchema>(payload)?),
            b"osrt" => TagValue::FirstColumn(decode_all::<CrateSchema>(payload)?),
            b"ptrk" => TagValue::TrackName(decode_utf16be(payload)?),
            b"otrk" => TagValue::Track(decode_all::<CrateSchema>(payload)?),
            b"orvc" => TagValue::UnknownContainer {
                raw: payload.to_vec(),
                tags: decode_opaque(payload),
            },
            _ => TagValue::Unknown(payload.to_vec()),
        };
        Ok(CrateTag { id, value })
    }
}

impl CrateTag {
    pub fn new(id: TagId, value: TagValue) -> Self {
        Self { id, value }
    }

    /// `otrk` wrapping a single `ptrk`
    pub fn track(path: &str) -> Self {
        Self::new(
            TRACK_TAG,
            TagValue::Track(vec![Self::new(
                TRACK_NAME_TAG,
                TagValue::TrackName(path.to_string()),
            )]),
        )
    }

    /// Nested tags of a container, empty for leaf tags
    pub fn children(&self) -> &[CrateTag] {
        match &self.value {
            TagValue::Column(tags)
            | TagValue::Track(tags)
            | TagValue::FirstColumn(tags)
            | TagValue::UnknownContainer { tags, .. } => tags,
            _ => &[],
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.value {
            TagValue::Metadata(s) | TagValue::ColumnName(s) | TagValue::TrackName(s) => Some(s),
            _ => None,
        }
    }

    /// Path of an `otrk` tag
    pub fn track_name(&self) -> Option<&str> {
        if !matches!(self.value, TagValue::Track(_)) {
            return None;
        }
        self.children().iter().find_map(|child| match &child.value {
            TagValue::TrackName(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Payload bytes as they appear on disk
    pub fn payload(&self) -> Vec<u8> {
        match &self.value {
            TagValue::Metadata(s) | TagValue::ColumnName(s) | TagValue::TrackName(s) => {
                encode_utf16be(s)
            }
            TagValue::Column(tags) | TagValue::Track(tags) | TagValue::FirstColumn(tags) => {
                encode_tags(tags)
            }
            TagValue::UnknownContainer { raw, .. } => raw.clone(),
            TagValue::Unknown(bytes) => bytes.clone(),
        }
    }

    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        write_tag(buffer, self.id, &self.payload());
    }
}

fn encode_tags(tags: &[CrateTag]) -> Vec<u8> {
    let mut buffer = Vec::new();
    for tag in tags {
        tag.encode_into(&mut buffer);
    }
    buffer
}

/// View of an `ovct` or `osrt` tag
#[derive(Debug, Clone, Copy)]
pub struct Column<'a> {
    tag: &'a CrateTag,
}

impl<'a> Column<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.tag.children().iter().find_map(|child| match &child.value {
            TagValue::ColumnName(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Only meaningful for the sort column
    pub fn is_reversed(&self) -> bool {
        self.tag.children().iter().any(|child| {
            child.id == SORT_REVERSE_TAG
                && matches!(&child.value, TagValue::Unknown(bytes) if bytes.first().is_some_and(|&b| b != 0))
        })
    }

    pub fn tags(&self) -> &'a [CrateTag] {
        self.tag.children()
    }
}

/// Decoded crate file, top-level tags in file order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Crate {
    pub tags: Vec<CrateTag>,
}

impl Crate {
    pub fn version(&self) -> Option<&str> {
        self.tags.iter().find_map(|tag| match &tag.value {
            TagValue::Metadata(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn columns(&self) -> impl Iterator<Item = Column<'_>> {
        self.tags
            .iter()
            .filter(|tag| matches!(tag.value, TagValue::Column(_)))
            .map(|tag| Column { tag })
    }

    pub fn sort_column(&self) -> Option<Column<'_>> {
        self.tags
            .iter()
            .find(|tag| matches!(tag.value, TagValue::FirstColumn(_)))
            .map(|tag| Column { tag })
    }

    /// `otrk` tags in display order
    pub fn tracks(&self) -> impl Iterator<Item = &CrateTag> {
        self.tags
            .iter()
            .filter(|tag| matches!(tag.value, TagValue::Track(_)))
    }

    pub fn track_names(&self) -> impl Iterator<Item = &str> {
        self.tracks().filter_map(CrateTag::track_name)
    }

    /// Top-level tags outside the type table
    pub fn unknown(&self) -> impl Iterator<Item = &CrateTag> {
        self.tags
            .iter()
            .filter(|tag| matches!(tag.value, TagValue::Unknown(_)))
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_tags(&self.tags)
    }

    pub fn to_playlist(&self, name: impl Into<String>) -> Playlist {
        let name = name.into();
        let mut tracks = Vec::new();
        for (position, track) in self.tracks().enumerate() {
            match track.track_name() {
                Some(path) => tracks.push(path.to_string()),
                None => warn!("Crate {:?}: track #{} has no path", name, position + 1),
            }
        }
        Playlist::new(name, tracks)
    }
}

/// Decode crate bytes
pub fn decode_crate(data: &[u8]) -> Result<Crate> {
    Ok(Crate {
        tags: decode_all::<CrateSchema>(data)?,
    })
}

pub fn encode_crate(decoded: &Crate) -> Vec<u8> {
    decoded.encode()
}

/// Read and decode a `.crate` file
pub fn load_crate<P: AsRef<Path>>(path: P) -> Result<Crate> {
    let path = path.as_ref();
    let is_crate = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(CRATE_EXTENSION));
    if !is_crate {
        return Err(Error::UnsupportedFile(path.to_path_buf()));
    }

    let data = fs::read(path)?;
    let decoded = decode_crate(&data)?;
    debug!("Decoded {:?}: {} tags", path, decoded.tags.len());
    Ok(decoded)
}

/// Read a `.crate` file as a playlist named after the file
pub fn read_crate_file<P: AsRef<Path>>(path: P) -> Result<Playlist> {
    let path = path.as_ref();
    let decoded = load_crate(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(decoded.to_playlist(name))
}
