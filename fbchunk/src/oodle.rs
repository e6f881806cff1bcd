//! Seam over the external decompression library

use std::fmt;

use parking_lot::Mutex;
use thiserror::Error;

/// Error reported by a [`Decompressor`] backend.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct DecompressorError(pub String);

/// Byte-in/byte-out decompression primitive.
///
/// The concrete backend for this title is the proprietary Oodle library
/// (`oo2core`), which is loaded and initialised by the embedding
/// application; the pipeline relies only on this contract:
///
/// - `decompress(src, dst_size)` returns exactly `dst_size` bytes, or an
///   error. Short or long output is treated as corruption by the caller.
/// - Implementations are called from multiple worker threads. A backend
///   that is not reentrant can be wrapped in [`SerializedDecompressor`].
/// - Any process-wide library initialisation must be performed before the
///   handle is used and must outlive every use of it.
pub trait Decompressor: Send + Sync {
    fn decompress(
        &self,
        src: &[u8],
        dst_size: usize,
    ) -> std::result::Result<Vec<u8>, DecompressorError>;
}

/// Serialises calls into a non-reentrant backend behind a mutex.
pub struct SerializedDecompressor<D> {
    inner: D,
    gate: Mutex<()>,
}

impl<D: Decompressor> SerializedDecompressor<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            gate: Mutex::new(()),
        }
    }
}

impl<D: Decompressor> Decompressor for SerializedDecompressor<D> {
    fn decompress(
        &self,
        src: &[u8],
        dst_size: usize,
    ) -> std::result::Result<Vec<u8>, DecompressorError> {
        let _guard = self.gate.lock();
        self.inner.decompress(src, dst_size)
    }
}

impl<D> fmt::Debug for SerializedDecompressor<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializedDecompressor").finish_non_exhaustive()
    }
}
