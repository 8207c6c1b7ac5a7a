//! Locating Serato Markers2 data inside audio file tags
//!
//! MP3 and WAV carry it in an ID3v2 GEOB frame described `Serato Markers2`:
//!
//! ```text
//! 01 01 <base64 text, newline every 72 chars> 00 00 ...
//! ```
//!
//! FLAC carries it in the `SERATO_MARKERS_V2` Vorbis comment, base64 encoded
//! twice: the outer layer decodes to a fixed MIME/description header followed
//! by exactly the GEOB body above.
//!
//! Both paths end in the raw buffer read by [`crate::markers`].

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;

use crate::error::{Error, Result};

pub const MARKERS2_GEOB_DESCRIPTION: &str = "Serato Markers2";
pub const MARKERS2_VORBIS_FIELD: &str = "SERATO_MARKERS_V2";

/// Leading bytes of the decoded FLAC comment
pub const FLAC_MARKERS2_HEADER: &[u8; 42] = b"application/octet-stream\0\0Serato Markers2\0";

/// Version prefix of the GEOB body, ahead of the base64 text
const GEOB_BODY_VERSION: [u8; 2] = [0x01, 0x01];

/// Serato drops padding and sometimes leaves a dangling final character
const SERATO_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// ID3v2 GEOB frame as handed out by the tag reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncapsulatedObject {
    pub description: String,
    pub data: Vec<u8>,
}

/// Native metadata of one audio file, as far as markers are concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeFrames {
    /// GEOB frames of an ID3v2 tag (MP3, WAV)
    Id3(Vec<EncapsulatedObject>),
    /// Vorbis comment fields (FLAC)
    Vorbis(Vec<(String, String)>),
}

impl NativeFrames {
    pub fn is_empty(&self) -> bool {
        match self {
            NativeFrames::Id3(frames) => frames.is_empty(),
            NativeFrames::Vorbis(comments) => comments.is_empty(),
        }
    }
}

/// Raw Markers2 buffer, or `None` if the file carries no Serato markers
pub fn extract_markers2(frames: &NativeFrames) -> Result<Option<Vec<u8>>> {
    match frames {
        NativeFrames::Id3(objects) => objects
            .iter()
            .find(|geob| geob.description == MARKERS2_GEOB_DESCRIPTION)
            .map(|geob| decode_geob_body(&geob.data))
            .transpose(),
        NativeFrames::Vorbis(comments) => comments
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(MARKERS2_VORBIS_FIELD))
            .map(|(_, value)| decode_vorbis_value(value))
            .transpose(),
    }
}

/// Unwrap a GEOB body: version prefix, then base64 up to the NUL padding
pub fn decode_geob_body(body: &[u8]) -> Result<Vec<u8>> {
    let text = body.strip_prefix(&GEOB_BODY_VERSION[..]).unwrap_or(body);
    let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
    decode_base64_lenient(&text[..end])
}

/// Unwrap the FLAC comment down to the same buffer the GEOB path yields
pub fn decode_vorbis_value(value: &str) -> Result<Vec<u8>> {
    let outer = decode_base64_lenient(value.as_bytes())?;
    let Some(body) = outer.strip_prefix(&FLAC_MARKERS2_HEADER[..]) else {
        let shown = &outer[..outer.len().min(FLAC_MARKERS2_HEADER.len())];
        return Err(Error::InvalidFrameHeader(format!(
            "{} comment header mismatch: {:?}",
            MARKERS2_VORBIS_FIELD,
            String::from_utf8_lossy(shown)
        )));
    };
    decode_geob_body(body)
}

/// Base64 with line breaks, optional padding and a possible stray last char
fn decode_base64_lenient(text: &[u8]) -> Result<Vec<u8>> {
    let mut cleaned: Vec<u8> = text
        .iter()
        .copied()
        .filter(|b| !matches!(b, b'\n' | b'\r'))
        .collect();
    while cleaned.last() == Some(&b'=') {
        cleaned.pop();
    }
    // A single leftover symbol carries fewer than 8 bits
    if cleaned.len() % 4 == 1 {
        cleaned.pop();
    }
    Ok(SERATO_BASE64.decode(&cleaned)?)
}
