//! Error types for layout resolution, CAS reads and extraction

use thiserror::Error;

/// Result type for storage and extraction operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("container parse error: {0}")]
    Container(#[from] sbtoc_parser::Error),

    #[error("chunk stream error: {0}")]
    Chunk(#[from] fbchunk::Error),

    /// Structural violation outside the container parsers, e.g. a CAS
    /// identifier field overflowing its derived width.
    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    /// The CAS file backing a part is not physically present. Non-fatal for
    /// the run: the part is logged and skipped.
    #[error("bundle data unavailable: {0}")]
    BundleUnavailable(String),
}

impl Error {
    /// Whether the extraction driver should count this as a skip instead of
    /// a failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::BundleUnavailable(_))
    }
}
