//! Error types for chunk parsing and decompression

use thiserror::Error;

use crate::oodle::DecompressorError;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Chunk stream ended before its declared sizes were satisfied.
    #[error("truncated chunk stream: wanted {wanted} more bytes, {left} left")]
    Truncated { wanted: usize, left: usize },

    /// Compression code outside the known set.
    #[error("unknown compression code {0:#06x}")]
    UnknownCompression(u16),

    /// Emitted or consumed byte totals disagree with the declared sizes.
    #[error("chunk stream size mismatch: {0}")]
    SizeMismatch(String),

    /// The external decompression library reported a failure.
    #[error("decompressor error: {0}")]
    Decompressor(#[from] DecompressorError),
}
