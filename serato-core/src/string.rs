//! Serato text encoding
//!
//! Crate files store every string as UTF-16 big-endian without a BOM or a
//! terminator; the tag length is the byte length of the text.
//!
//! Marker entries use NUL-terminated ASCII names and UTF-8 cue labels.

use crate::error::{Error, Result};

/// Decode a UTF-16BE payload
pub fn decode_utf16be(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::StringEncoding(format!(
            "UTF-16 payload has odd length {}",
            bytes.len()
        )));
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    String::from_utf16(&units).map_err(|e| Error::StringEncoding(e.to_string()))
}

/// Encode a string as UTF-16BE
pub fn encode_utf16be(s: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(s.len() * 2);
    for unit in s.encode_utf16() {
        result.extend_from_slice(&unit.to_be_bytes());
    }
    result
}

/// Read a NUL-terminated UTF-8 string from the start of `bytes`
///
/// A missing terminator takes the whole slice. Returns `None` for an empty
/// string.
pub fn decode_nul_terminated(bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    if end == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
}
