//! Common types produced by the container parsers

use std::fmt;

/// 20-byte content identifier. Treated as opaque; equality alone defines
/// identity, and two parts with the same SHA1 are byte-identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sha1([u8; 20]);

impl Sha1 {
    pub fn new(data: [u8; 20]) -> Self {
        Self(data)
    }

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        if data.len() == 20 {
            let mut id = [0u8; 20];
            id.copy_from_slice(data);
            Some(Self(id))
        } else {
            None
        }
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Sha1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// 16-byte UID used for chunk parts and install package identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid([u8; 16]);

impl Guid {
    pub fn new(data: [u8; 16]) -> Self {
        Self(data)
    }

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        if data.len() == 16 {
            let mut id = [0u8; 16];
            id.copy_from_slice(data);
            Some(Self(id))
        } else {
            None
        }
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Packed 32-bit CAS identifier as it appears on the wire.
///
/// The field decomposition (layer, package, cas file index) lives with the
/// layout resolver; parsers carry the value opaquely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CasId(u32);

impl CasId {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Locator triple shared by every part: where the compressed bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartLocator {
    /// Content identifier of the part.
    pub sha1: Sha1,
    /// Packed CAS identifier naming the archive file.
    pub cas_id: CasId,
    /// Absolute offset of the chunk stream inside the CAS file.
    pub offset: u64,
    /// Total compressed size of the chunk stream.
    pub compressed_size: u64,
    /// Opaque flags word, carried verbatim.
    pub flags: u32,
}

/// An EBX part: a typed asset with a logical filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EbxPart {
    /// Slash-separated logical path, no extension.
    pub name: String,
    /// Size of the part once decompressed.
    pub uncompressed_size: u64,
    pub locator: PartLocator,
}

/// A RES part: a resource with a content-type code and an opaque meta blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResPart {
    /// Slash-separated logical path, no extension.
    pub name: String,
    /// Size of the part once decompressed.
    pub uncompressed_size: u64,
    /// Content-type code, not interpreted here.
    pub res_type: u32,
    /// Opaque metadata, carried verbatim for downstream tools.
    pub res_meta: Vec<u8>,
    pub locator: PartLocator,
}

/// A CHUNK part: raw data addressed by UID, flat size not pre-known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPart {
    pub id: Guid,
    /// Opaque metadata, carried verbatim for downstream tools.
    pub meta: Vec<u8>,
    pub locator: PartLocator,
}

/// A named grouping of parts, in declared EBX / RES / CHUNKS order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bundle {
    pub name: String,
    pub ebx: Vec<EbxPart>,
    pub res: Vec<ResPart>,
    pub chunks: Vec<ChunkPart>,
}

/// A part declared directly at the layout or TOC level, outside any bundle.
/// Its output identity is the SHA1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocResource {
    /// Optional UID, present on chunk-style resources.
    pub id: Option<Guid>,
    pub sha1: Sha1,
    pub cas_id: CasId,
    pub offset: u64,
    /// Compressed size; the flat size is not recorded for TOC resources.
    pub size: u64,
}
