//! Error types for serato-core

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Declared length runs past the end of the buffer, or a zero length
    /// where the format forbids one.
    #[error("Truncated payload in {context}: expected {expected} bytes, {available} available")]
    TruncatedPayload {
        context: String,
        expected: usize,
        available: usize,
    },

    #[error("Invalid frame header: {0}")]
    InvalidFrameHeader(String),

    #[error("Unsupported file: {0:?}")]
    UnsupportedFile(PathBuf),

    #[error("Missing Subcrates directory in {0:?}")]
    MissingSubcrateDirectory(PathBuf),

    #[error("String encoding error: {0}")]
    StringEncoding(String),

    #[error("Base64 error: {0}")]
    Base64(String),

    #[error("Binary format error: {0}")]
    BinRw(String),

    #[error("Metadata error: {0}")]
    Metadata(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn truncated(context: impl Into<String>, expected: usize, available: usize) -> Self {
        Error::TruncatedPayload {
            context: context.into(),
            expected,
            available,
        }
    }
}

impl From<binrw::Error> for Error {
    fn from(e: binrw::Error) -> Self {
        Error::BinRw(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::Base64(e.to_string())
    }
}
