//! Chunked decompression pipeline

use tracing::{debug, trace};

use crate::codec::CompressionCode;
use crate::header::{CHUNK_HEADER_LEN, ChunkHeader};
use crate::oodle::Decompressor;
use crate::{Error, Result};

/// Decompress one chunk stream.
///
/// `src` carries exactly the compressed byte range of the part. When the
/// part's flat size is known (`flat_size = Some(n)`), the pipeline stops
/// once `n` bytes have been emitted and requires `src` to be fully consumed
/// at that point. When it is not known (TOC resources and chunk parts), the
/// pipeline stops when `src` is exhausted. Any disagreement between the
/// declared and observed totals is fatal for the part.
pub fn decompress_stream(
    src: &[u8],
    flat_size: Option<u64>,
    decompressor: &dyn Decompressor,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut consumed = 0usize;

    loop {
        if let Some(total) = flat_size {
            if out.len() as u64 == total {
                if consumed != src.len() {
                    return Err(Error::SizeMismatch(format!(
                        "stream complete at {total} flat bytes with {} compressed bytes left",
                        src.len() - consumed
                    )));
                }
                break;
            }
            if consumed == src.len() {
                return Err(Error::SizeMismatch(format!(
                    "compressed data exhausted with {} of {total} flat bytes emitted",
                    out.len()
                )));
            }
        } else if consumed == src.len() {
            break;
        }

        let left = src.len() - consumed;
        if left < CHUNK_HEADER_LEN {
            return Err(Error::Truncated {
                wanted: CHUNK_HEADER_LEN,
                left,
            });
        }
        let header = ChunkHeader::parse(&mut &src[consumed..consumed + CHUNK_HEADER_LEN])?;
        let code = CompressionCode::from_wire(header.code)?;
        consumed += CHUNK_HEADER_LEN;

        let payload_len = header.compressed_size as usize;
        let left = src.len() - consumed;
        if payload_len > left {
            return Err(Error::Truncated {
                wanted: payload_len,
                left,
            });
        }
        let payload = &src[consumed..consumed + payload_len];
        consumed += payload_len;

        let chunk_flat = header.flat_size();
        if let Some(total) = flat_size {
            let remaining = total - out.len() as u64;
            if chunk_flat as u64 > remaining {
                return Err(Error::SizeMismatch(format!(
                    "chunk emits {chunk_flat} bytes with only {remaining} left \
                     to the declared flat size"
                )));
            }
        }

        trace!(
            "chunk: {code:?}, {payload_len} compressed -> {chunk_flat} flat"
        );

        if code.is_stored() {
            if payload_len != chunk_flat {
                return Err(Error::SizeMismatch(format!(
                    "stored chunk declares {chunk_flat} flat bytes but carries {payload_len}"
                )));
            }
            out.extend_from_slice(payload);
        } else {
            let bytes = decompressor.decompress(payload, chunk_flat)?;
            if bytes.len() != chunk_flat {
                return Err(Error::SizeMismatch(format!(
                    "decompressor returned {} bytes, expected {chunk_flat}",
                    bytes.len()
                )));
            }
            out.extend_from_slice(&bytes);
        }
    }

    debug!(
        "chunk stream: {} compressed -> {} flat bytes",
        src.len(),
        out.len()
    );
    Ok(out)
}
