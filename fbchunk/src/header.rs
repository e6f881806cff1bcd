//! Chunk header parsing

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::Read;

use crate::Result;

/// Wire size of a chunk header.
pub const CHUNK_HEADER_LEN: usize = 8;

/// Uncompressed payload carried by every non-final chunk of a stream.
pub const CHUNK_FLAT_MAX: usize = 0x10000;

/// The 8-byte header in front of every compressed chunk.
///
/// The uncompressed-size field is 16 bits wide and wraps for full chunks: a
/// stored value of zero means [`CHUNK_FLAT_MAX`]. Mixed endianness is part
/// of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Big-endian on the wire. Zero encodes a full 0x10000-byte chunk.
    pub uncompressed_size: u16,
    /// Little-endian within its two bytes.
    pub code: u16,
    /// Big-endian on the wire.
    pub compressed_size: u32,
}

impl ChunkHeader {
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let uncompressed_size = reader.read_u16::<BigEndian>()?;
        let code = reader.read_u16::<LittleEndian>()?;
        let compressed_size = reader.read_u32::<BigEndian>()?;
        Ok(Self {
            uncompressed_size,
            code,
            compressed_size,
        })
    }

    /// Actual uncompressed size of this chunk, with the wraparound applied.
    pub fn flat_size(&self) -> usize {
        if self.uncompressed_size == 0 {
            CHUNK_FLAT_MAX
        } else {
            usize::from(self.uncompressed_size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn parses_mixed_endian_fields() {
        // uncompressed 5 (BE), code 0x1170 (LE), compressed 0x1234 (BE)
        let data = [0x00, 0x05, 0x70, 0x11, 0x00, 0x00, 0x12, 0x34];
        let header = ChunkHeader::parse(&mut &data[..]).unwrap();
        assert_eq!(header.uncompressed_size, 5);
        assert_eq!(header.code, 0x1170);
        assert_eq!(header.compressed_size, 0x1234);
        assert_eq!(header.flat_size(), 5);
    }

    #[test]
    fn zero_flat_size_means_full_chunk() {
        let data = [0x00, 0x00, 0x70, 0x00, 0x00, 0x01, 0x00, 0x00];
        let header = ChunkHeader::parse(&mut &data[..]).unwrap();
        assert_eq!(header.uncompressed_size, 0);
        assert_eq!(header.flat_size(), CHUNK_FLAT_MAX);
    }

    #[test]
    fn short_read_is_io_error() {
        let data = [0x00, 0x05];
        assert!(matches!(
            ChunkHeader::parse(&mut &data[..]),
            Err(Error::Io(_))
        ));
    }
}
