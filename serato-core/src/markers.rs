//! Serato Markers2 entries
//!
//! After unwrapping (see [`crate::container`]) the buffer looks like:
//!
//! ```text
//! 01 01                       header
//! "COLOR" 00 <u32 BE len> ..  entry
//! "CUE" 00 <u32 BE len> ..    entry
//! ...
//! 00                          empty name ends the stream
//! ```
//!
//! Unlike crate files the entry type is a NUL-terminated name, not a fixed
//! four-byte id, so this grammar has its own reader.

use std::io::Cursor;

use binrw::{binread, BinRead};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::reader::ByteReader;
use crate::string::decode_nul_terminated;
use crate::track::{Cue, Rgb};

pub const MARKERS_HEADER: [u8; 2] = [0x01, 0x01];

/// Offset of the optional label inside a CUE payload
const CUE_LABEL_OFFSET: usize = 12;
const CUE_MIN_LEN: usize = 10;
const COLOR_MIN_LEN: usize = 4;

/// `CUE` payload up to the colour; label follows at byte 12
#[binread]
#[br(big)]
struct CuePayload {
    #[br(pad_before = 1)]
    index: u8,
    position_ms: u32,
    #[br(pad_before = 1)]
    color: [u8; 3],
}

/// `COLOR` payload: track colour
#[binread]
#[br(big)]
struct ColorPayload {
    #[br(pad_before = 1)]
    color: [u8; 3],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MarkerEntry {
    Color { color: Rgb },
    Cue(Cue),
    BpmLock { enabled: bool },
    /// LOOP, FLIP and anything newer
    Unknown { name: String, payload: Vec<u8> },
}

impl MarkerEntry {
    fn interpret(name: &[u8], payload: &[u8]) -> Result<Self> {
        match name {
            b"COLOR" => {
                if payload.len() < COLOR_MIN_LEN {
                    return Err(Error::truncated("COLOR entry", COLOR_MIN_LEN, payload.len()));
                }
                let parsed = ColorPayload::read(&mut Cursor::new(payload))?;
                Ok(MarkerEntry::Color {
                    color: Rgb::from_bytes(parsed.color),
                })
            }
            b"CUE" => {
                if payload.len() < CUE_MIN_LEN {
                    return Err(Error::truncated("CUE entry", CUE_MIN_LEN, payload.len()));
                }
                let parsed = CuePayload::read(&mut Cursor::new(payload))?;
                let label = payload
                    .get(CUE_LABEL_OFFSET..)
                    .and_then(decode_nul_terminated);
                Ok(MarkerEntry::Cue(Cue {
                    index: parsed.index,
                    position_ms: parsed.position_ms,
                    color: Rgb::from_bytes(parsed.color),
                    label,
                }))
            }
            b"BPMLOCK" => Ok(MarkerEntry::BpmLock {
                enabled: payload[0] != 0,
            }),
            _ => Ok(MarkerEntry::Unknown {
                name: String::from_utf8_lossy(name).into_owned(),
                payload: payload.to_vec(),
            }),
        }
    }
}

/// Iterator over the entries of a Markers2 buffer
pub struct MarkerStream<'a> {
    reader: ByteReader<'a>,
    failed: bool,
}

impl<'a> MarkerStream<'a> {
    /// Check the `01 01` header and position the stream after it
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        match reader.peek(MARKERS_HEADER.len()) {
            Some(header) if header == MARKERS_HEADER => {}
            Some(header) => {
                return Err(Error::InvalidFrameHeader(format!(
                    "Markers2 buffer starts with {:02x?}, expected {:02x?}",
                    header, MARKERS_HEADER
                )));
            }
            None => {
                return Err(Error::InvalidFrameHeader(format!(
                    "Markers2 buffer too short for header ({} bytes)",
                    data.len()
                )));
            }
        }
        reader.read(MARKERS_HEADER.len());

        Ok(Self {
            reader,
            failed: false,
        })
    }

    /// Bytes up to the next NUL, or to the end of the buffer
    fn read_name(&mut self) -> Vec<u8> {
        let mut name = Vec::new();
        while let Some(byte) = self.reader.read_u8() {
            if byte == 0 {
                break;
            }
            name.push(byte);
        }
        name
    }

    fn next_entry(&mut self) -> Result<Option<MarkerEntry>> {
        let name = self.read_name();
        if name.is_empty() {
            return Ok(None);
        }
        let context = String::from_utf8_lossy(&name).into_owned();

        let Some(length) = self.reader.read_u32_be() else {
            return Err(Error::truncated(format!("{} length", context), 4, self.reader.remaining()));
        };
        let length = length as usize;
        if length == 0 {
            return Err(Error::truncated(format!("{} payload", context), 1, 0));
        }
        let Some(payload) = self.reader.read(length) else {
            return Err(Error::truncated(
                format!("{} payload", context),
                length,
                self.reader.remaining(),
            ));
        };

        MarkerEntry::interpret(&name, payload).map(Some)
    }
}

impl<'a> Iterator for MarkerStream<'a> {
    type Item = Result<MarkerEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = self.next_entry().transpose()?;
        self.failed = result.is_err();
        Some(result)
    }
}

/// Decode every entry of a Markers2 buffer
pub fn decode_markers(data: &[u8]) -> Result<Vec<MarkerEntry>> {
    MarkerStream::new(data)?.collect()
}

/// Keep only the hot cues, in stream order
pub fn cue_points(entries: Vec<MarkerEntry>) -> Vec<Cue> {
    entries
        .into_iter()
        .filter_map(|entry| match entry {
            MarkerEntry::Cue(cue) => Some(cue),
            _ => None,
        })
        .collect()
}
