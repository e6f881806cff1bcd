//! Superbundle TOC and SB container parsing
//!
//! A superbundle is a TOC (wrapped body, see [`crate::toc`]) plus an optional
//! companion SB file holding the bundle bodies. The TOC either records a
//! byte range into the SB per bundle, or — for small TOC-only superbundles —
//! embeds the bundle bodies inline.

use tracing::{debug, warn};

use crate::dbobject::{self, DbNode, DbObject};
use crate::error::{Error, Result};
use crate::reader::FbReader;
use crate::toc::{Toc, parse_toc_resource};
use crate::types::{
    Bundle, CasId, ChunkPart, EbxPart, PartLocator, ResPart, TocResource,
};

/// Leading magic of an SB file, compared big-endian.
pub const SB_MAGIC: u32 = 0x0000_0020;

/// A parsed superbundle TOC.
#[derive(Debug, Clone)]
pub struct SuperbundleToc {
    /// Superbundle name as recorded by the engine, when present.
    pub name: Option<String>,
    /// Whether part locators reference CAS archives. Always the case for
    /// this title; carried for diagnostics.
    pub cas: bool,
    pub entries: Vec<TocBundleEntry>,
    /// Parts declared at the TOC level, outside any bundle.
    pub resources: Vec<TocResource>,
}

/// One bundle as declared by the TOC.
#[derive(Debug, Clone)]
pub enum TocBundleEntry {
    /// The bundle body lives in the companion SB file at this byte range.
    Ranged { id: String, offset: u64, size: u64 },
    /// The bundle body is embedded in the TOC itself.
    Inline(Bundle),
}

/// A bundle after SB cross-linking. Bundles whose SB range lies outside the
/// available data are kept with an explicit marker, never dropped.
#[derive(Debug, Clone)]
pub enum BundleRecord {
    Loaded(Bundle),
    Unavailable { name: String },
}

impl SuperbundleToc {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let toc = Toc::parse(data)?;
        Self::from_root(toc.root())
    }

    fn from_root(root: &DbObject) -> Result<Self> {
        let mut name = None;
        let mut cas = false;
        let mut entries = Vec::new();
        let mut resources = Vec::new();

        for (field, node) in root.entries() {
            match field {
                "name" => name = node.as_str().map(str::to_owned),
                "cas" => cas = node.as_bool().unwrap_or(false),
                "bundles" => {
                    for item in node.as_list().unwrap_or_default() {
                        let obj = item.as_object().ok_or_else(|| {
                            Error::FormatMismatch("bundle entry is not an object".into())
                        })?;
                        entries.push(parse_bundle_entry(obj)?);
                    }
                }
                "chunks" => {
                    for item in node.as_list().unwrap_or_default() {
                        let obj = item.as_object().ok_or_else(|| {
                            Error::FormatMismatch("TOC chunk entry is not an object".into())
                        })?;
                        resources.push(parse_toc_resource(obj)?);
                    }
                }
                other => debug!("unknown superbundle TOC field `{other}`"),
            }
        }

        Ok(Self {
            name,
            cas,
            entries,
            resources,
        })
    }
}

fn parse_bundle_entry(obj: &DbObject) -> Result<TocBundleEntry> {
    if obj.field("offset").is_some() {
        Ok(TocBundleEntry::Ranged {
            id: obj.require_str("id")?.to_owned(),
            offset: obj.require_u64("offset")?,
            size: obj.require_u64("size")?,
        })
    } else {
        parse_bundle(obj).map(TocBundleEntry::Inline)
    }
}

/// Cross-link TOC bundle entries with the companion SB data, when present.
///
/// `sb` carries the whole SB file; ranges recorded by the TOC are absolute
/// within it. A `Ranged` entry without SB data is a format violation — the
/// TOC promised a companion that does not exist.
pub fn resolve_bundles(
    entries: Vec<TocBundleEntry>,
    sb: Option<&[u8]>,
) -> Result<Vec<BundleRecord>> {
    if let Some(sb) = sb {
        let mut reader = FbReader::new(sb);
        let magic = reader.read_u32_be()?;
        if magic != SB_MAGIC {
            return Err(Error::FormatMismatch(format!(
                "bad SB magic {magic:#010x}, expected {SB_MAGIC:#010x}"
            )));
        }
    }

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            TocBundleEntry::Inline(bundle) => out.push(BundleRecord::Loaded(bundle)),
            TocBundleEntry::Ranged { id, offset, size } => {
                let Some(sb) = sb else {
                    return Err(Error::FormatMismatch(format!(
                        "bundle `{id}` needs a companion SB file"
                    )));
                };
                let end = offset.checked_add(size);
                let range = end.and_then(|end| {
                    sb.get(offset as usize..end as usize)
                });
                let Some(body) = range else {
                    warn!(
                        "bundle `{id}` range {offset}+{size} lies outside the \
                         superbundle data, marking unavailable"
                    );
                    out.push(BundleRecord::Unavailable { name: id });
                    continue;
                };
                let node = dbobject::parse_root(FbReader::new(body))?;
                let obj = node.as_object().ok_or_else(|| {
                    Error::FormatMismatch(format!("bundle `{id}` body is not an object"))
                })?;
                let mut bundle = parse_bundle(obj)?;
                if bundle.name.is_empty() {
                    bundle.name = id;
                }
                out.push(BundleRecord::Loaded(bundle));
            }
        }
    }
    Ok(out)
}

/// Decode one bundle body into its EBX / RES / CHUNKS part lists.
pub fn parse_bundle(obj: &DbObject) -> Result<Bundle> {
    let mut bundle = Bundle {
        name: obj
            .field("path")
            .and_then(DbNode::as_str)
            .unwrap_or_default()
            .to_owned(),
        ..Bundle::default()
    };

    for item in obj.get_list("ebx").unwrap_or_default() {
        let entry = item.as_object().ok_or_else(|| {
            Error::FormatMismatch("ebx entry is not an object".into())
        })?;
        bundle.ebx.push(parse_ebx_entry(entry)?);
    }
    for item in obj.get_list("res").unwrap_or_default() {
        let entry = item.as_object().ok_or_else(|| {
            Error::FormatMismatch("res entry is not an object".into())
        })?;
        bundle.res.push(parse_res_entry(entry)?);
    }
    for item in obj.get_list("chunks").unwrap_or_default() {
        let entry = item.as_object().ok_or_else(|| {
            Error::FormatMismatch("chunk entry is not an object".into())
        })?;
        bundle.chunks.push(parse_chunk_entry(entry)?);
    }

    Ok(bundle)
}

fn parse_locator(obj: &DbObject) -> Result<PartLocator> {
    Ok(PartLocator {
        sha1: obj.require_sha1("sha1")?,
        cas_id: CasId::new(obj.require_u32("casId")?),
        offset: obj.require_u64("offset")?,
        compressed_size: obj.require_u64("compressedSize")?,
        flags: obj.field("flags").and_then(DbNode::as_u32).unwrap_or(0),
    })
}

fn parse_ebx_entry(obj: &DbObject) -> Result<EbxPart> {
    Ok(EbxPart {
        name: obj.require_str("name")?.to_owned(),
        uncompressed_size: obj.require_u64("size")?,
        locator: parse_locator(obj)?,
    })
}

fn parse_res_entry(obj: &DbObject) -> Result<ResPart> {
    Ok(ResPart {
        name: obj.require_str("name")?.to_owned(),
        uncompressed_size: obj.require_u64("size")?,
        res_type: obj.require_u32("resType")?,
        res_meta: obj.get_blob("resMeta").unwrap_or_default().to_vec(),
        locator: parse_locator(obj)?,
    })
}

fn parse_chunk_entry(obj: &DbObject) -> Result<ChunkPart> {
    Ok(ChunkPart {
        id: obj.require_guid("id")?,
        meta: obj.get_blob("meta").unwrap_or_default().to_vec(),
        locator: parse_locator(obj)?,
    })
}
