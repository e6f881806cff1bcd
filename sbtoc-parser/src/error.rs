//! Error types for container and tag stream parsing

use thiserror::Error;

/// Result type for parser operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Unexpected end of stream, or a declared length that exceeds the
    /// remaining bytes.
    #[error("unexpected end of stream: {0}")]
    Truncated(String),

    /// Magic, container length, or structural violation.
    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    /// A tag stream record with a type code this dialect does not define.
    #[error("unknown tag stream type code {0:#04x}")]
    UnknownTypeCode(u8),
}

impl Error {
    pub(crate) fn truncated(wanted: usize, left: usize) -> Self {
        Self::Truncated(format!("wanted {wanted} more bytes, {left} left"))
    }
}
