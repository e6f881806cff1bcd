//! Compression code enumeration

use crate::{Error, Result};

/// Wire code for payloads compressed with the external library.
pub const CODE_OODLE: u16 = 0x1170;

/// Wire code for payloads stored verbatim.
pub const CODE_STORED: u16 = 0x0070;

/// Alternate wire code for payloads stored verbatim.
pub const CODE_STORED_ALT: u16 = 0x0071;

/// The 16-bit compression code carried by every chunk header.
///
/// The code is believed to decompose into sub-fields, but only these three
/// values have been observed; everything else is rejected rather than
/// guessed at. `0x0070` and `0x0071` behave identically — both copy the
/// payload verbatim — and the distinction between them is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionCode {
    /// Payload compressed with the external Oodle library.
    Oodle,
    /// Payload stored verbatim.
    Stored,
    /// Payload stored verbatim, alternate wire code.
    StoredAlt,
}

impl CompressionCode {
    pub fn from_wire(code: u16) -> Result<Self> {
        match code {
            CODE_OODLE => Ok(Self::Oodle),
            CODE_STORED => Ok(Self::Stored),
            CODE_STORED_ALT => Ok(Self::StoredAlt),
            other => Err(Error::UnknownCompression(other)),
        }
    }

    pub fn is_stored(self) -> bool {
        matches!(self, Self::Stored | Self::StoredAlt)
    }
}
