//! Length-prefixed tag streams
//!
//! Serato crate files (and a few nested payloads inside them) are a flat
//! sequence of records:
//!
//! ```text
//! +--------+----------------+------------------+
//! | id (4) | length (4, BE) | payload (length) |
//! +--------+----------------+------------------+
//! ```
//!
//! What a payload means depends on the id. A [`TagSchema`] maps ids to
//! payload interpreters; an interpreter may decode the payload as a nested
//! tag stream. Ids a schema does not know are kept as raw bytes.

use std::fmt;
use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::reader::ByteReader;

/// Four-byte tag identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagId(pub [u8; 4]);

impl TagId {
    pub const fn new(id: &[u8; 4]) -> Self {
        Self(*id)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagId({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Type table for one tag grammar
pub trait TagSchema {
    type Tag;

    /// Turn a complete payload into a tag
    ///
    /// Must accept every id, producing an opaque tag for unknown ones.
    fn interpret(id: TagId, payload: &[u8]) -> Result<Self::Tag>;
}

/// Raw record as read from the stream, before interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTag<'a> {
    pub id: TagId,
    pub payload: &'a [u8],
}

/// Read one raw record
///
/// `Ok(None)` is the clean end of the stream: fewer than four bytes left for
/// the next id. A length or payload that runs past the buffer is an error.
pub fn read_raw_tag<'a>(reader: &mut ByteReader<'a>) -> Result<Option<RawTag<'a>>> {
    let Some(id) = reader.read(4) else {
        return Ok(None);
    };
    let id = TagId([id[0], id[1], id[2], id[3]]);

    let Some(length) = reader.read_u32_be() else {
        return Err(Error::truncated(format!("{} length", id), 4, reader.remaining()));
    };
    let length = length as usize;

    let Some(payload) = reader.read(length) else {
        return Err(Error::truncated(format!("{} payload", id), length, reader.remaining()));
    };

    Ok(Some(RawTag { id, payload }))
}

/// Iterator over the interpreted tags of one stream
///
/// Yields at most one error: after a failure the stream is not resumable
/// because the record boundaries are lost.
pub struct TagStream<'a, S> {
    reader: ByteReader<'a>,
    failed: bool,
    _schema: PhantomData<S>,
}

impl<'a, S: TagSchema> TagStream<'a, S> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: ByteReader::new(data),
            failed: false,
            _schema: PhantomData,
        }
    }
}

impl<'a, S: TagSchema> Iterator for TagStream<'a, S> {
    type Item = Result<S::Tag>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = match read_raw_tag(&mut self.reader) {
            Ok(None) => return None,
            Ok(Some(raw)) => S::interpret(raw.id, raw.payload),
            Err(e) => Err(e),
        };
        self.failed = result.is_err();
        Some(result)
    }
}

/// Decode a whole buffer with the given schema
pub fn decode_all<S: TagSchema>(data: &[u8]) -> Result<Vec<S::Tag>> {
    TagStream::<S>::new(data).collect()
}

/// Append one encoded record to `buffer`
pub fn write_tag(buffer: &mut Vec<u8>, id: TagId, payload: &[u8]) {
    buffer.extend_from_slice(id.as_bytes());
    buffer.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buffer.extend_from_slice(payload);
}
