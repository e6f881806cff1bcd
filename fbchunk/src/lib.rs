//! Chunked compression codec for Frostbite CAS payloads
//!
//! Compressed byte ranges inside CAS archives (and embedded in SB files) are
//! sequences of chunks, each led by an 8-byte header naming its compression
//! code and sizes. This crate parses those headers and drives the
//! decompression pipeline; the actual external library sits behind the
//! [`Decompressor`] seam.

mod codec;
mod decompress;
mod error;
mod header;
mod oodle;

pub use codec::{CODE_OODLE, CODE_STORED, CODE_STORED_ALT, CompressionCode};
pub use decompress::decompress_stream;
pub use error::{Error, Result};
pub use header::{CHUNK_FLAT_MAX, CHUNK_HEADER_LEN, ChunkHeader};
pub use oodle::{Decompressor, DecompressorError, SerializedDecompressor};
