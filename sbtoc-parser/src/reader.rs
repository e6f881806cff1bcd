//! Bounded little-endian cursor over container bytes
//!
//! Every container in these formats is length-prefixed, so the reader hands
//! out independent bounded sub-readers instead of tracking nesting itself.

use crate::error::{Error, Result};
use crate::types::{Guid, Sha1};

/// Maximum encoded length of a variable-length integer, in bytes.
pub const VARINT_MAX_BYTES: usize = 9;

/// Cursor over a byte slice. Integer reads are little-endian unless the
/// method name says otherwise; big-endian reads exist only for the container
/// header magics.
#[derive(Debug, Clone)]
pub struct FbReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FbReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of this reader's view.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Absolute seek within this reader's view.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::truncated(pos - self.data.len(), 0));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Read `n` raw bytes, advancing the cursor.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::truncated(n, self.remaining()));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Independent cursor bounded to the next `len` bytes; the parent cursor
    /// advances past them.
    pub fn sub_reader(&mut self, len: usize) -> Result<FbReader<'a>> {
        Ok(FbReader::new(self.take(len)?))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let b = self.take(8)?;
        Ok(i64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Big-endian u32, used for the container header magics.
    pub fn read_u32_be(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Big-endian u32 at the cursor without advancing. `None` past the end.
    pub fn peek_u32_be(&self) -> Option<u32> {
        let b = self.data.get(self.pos..self.pos + 4)?;
        Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Variable-length unsigned integer: seven data bits per byte, MSB is the
    /// continuation flag, least-significant group first. At most
    /// [`VARINT_MAX_BYTES`] bytes; a continuation flag on the last permitted
    /// byte fails with [`Error::Truncated`].
    pub fn read_varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for group in 0..VARINT_MAX_BYTES {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7f) << (7 * group as u32);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::Truncated(format!(
            "varint continues past {VARINT_MAX_BYTES} bytes"
        )))
    }

    /// Length-prefixed string: varint byte count that includes the trailing
    /// NUL terminator.
    pub fn read_sized_string(&mut self) -> Result<String> {
        let len = self.read_varint()? as usize;
        if len == 0 {
            return Err(Error::FormatMismatch(
                "sized string with zero length".into(),
            ));
        }
        let raw = self.take(len)?;
        let (body, terminator) = raw.split_at(len - 1);
        if terminator != [0] {
            return Err(Error::FormatMismatch(
                "sized string missing NUL terminator".into(),
            ));
        }
        string_from_bytes(body)
    }

    /// Null-terminated string.
    pub fn read_cstring(&mut self) -> Result<String> {
        let rest = &self.data[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::Truncated("unterminated string".into()))?;
        let s = string_from_bytes(&rest[..nul])?;
        self.pos += nul + 1;
        Ok(s)
    }

    pub fn read_sha1(&mut self) -> Result<Sha1> {
        let b = self.take(20)?;
        let mut raw = [0u8; 20];
        raw.copy_from_slice(b);
        Ok(Sha1::new(raw))
    }

    pub fn read_guid(&mut self) -> Result<Guid> {
        let b = self.take(16)?;
        let mut raw = [0u8; 16];
        raw.copy_from_slice(b);
        Ok(Guid::new(raw))
    }
}

fn string_from_bytes(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| Error::FormatMismatch(format!("string field is not UTF-8: {e}")))
}
