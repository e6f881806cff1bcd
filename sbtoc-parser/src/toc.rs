//! TOC container parsing
//!
//! A TOC file starts with the big-endian magic `0x00D1CE01`, carries an
//! opaque fixed-size header region, and holds its tag stream body at offset
//! `0x22C`. Superbundle TOCs wrap the body in one extra container whose
//! leading four bytes are the big-endian magic `0x00000030`; exactly one such
//! layer is unwrapped when present.

use tracing::debug;

use crate::dbobject::{self, DbNode, DbObject};
use crate::error::{Error, Result};
use crate::reader::FbReader;
use crate::types::{CasId, TocResource};

/// Leading magic of every TOC file, compared big-endian.
pub const TOC_MAGIC: u32 = 0x00d1_ce01;

/// Offset of the tag stream body; the header region before it is not modeled.
pub const TOC_BODY_OFFSET: usize = 0x22c;

/// Magic of the optional outer wrapper on superbundle TOC bodies.
pub const TOC_WRAPPER_MAGIC: u32 = 0x0000_0030;

/// A parsed TOC: the root object of its tag stream body.
#[derive(Debug, Clone)]
pub struct Toc {
    root: DbObject,
}

impl Toc {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = FbReader::new(data);
        let magic = reader.read_u32_be()?;
        if magic != TOC_MAGIC {
            return Err(Error::FormatMismatch(format!(
                "bad TOC magic {magic:#010x}, expected {TOC_MAGIC:#010x}"
            )));
        }
        if data.len() < TOC_BODY_OFFSET {
            return Err(Error::Truncated(format!(
                "TOC header region needs {TOC_BODY_OFFSET:#x} bytes, file has {}",
                data.len()
            )));
        }
        reader.seek(TOC_BODY_OFFSET)?;
        if reader.peek_u32_be() == Some(TOC_WRAPPER_MAGIC) {
            reader.skip(4)?;
        }

        let node = dbobject::parse_root(reader)?;
        match node {
            DbNode::Object(root) => Ok(Self { root }),
            other => Err(Error::FormatMismatch(format!(
                "TOC body root is not an object: {other:?}"
            ))),
        }
    }

    pub fn root(&self) -> &DbObject {
        &self.root
    }
}

/// Parse one TOC-level resource entry (a part declared outside any bundle).
pub(crate) fn parse_toc_resource(obj: &DbObject) -> Result<TocResource> {
    Ok(TocResource {
        id: obj.field("id").and_then(DbNode::as_guid),
        sha1: obj.require_sha1("sha1")?,
        cas_id: CasId::new(obj.require_u32("casId")?),
        offset: obj.require_u64("offset")?,
        size: obj.require_u64("size")?,
    })
}

/// The layout descriptor: the TOC at a layer root, enumerating the layer's
/// installation packages and free-standing superbundles.
#[derive(Debug, Clone, Default)]
pub struct LayoutDescriptor {
    /// Layer name as recorded by the engine, when present.
    pub name: Option<String>,
    /// Free-standing (shared) superbundles, as relative paths without
    /// extension.
    pub superbundles: Vec<String>,
    /// Installation packages in declared order; the list index is the
    /// package id used inside CAS identifiers.
    pub packages: Vec<PackageDescriptor>,
    /// Parts declared directly at the layout level.
    pub resources: Vec<TocResource>,
}

/// One installation package of a layer.
#[derive(Debug, Clone, Default)]
pub struct PackageDescriptor {
    pub name: String,
    /// Directory holding the package's `cas_NN.cas` files, relative to the
    /// layer root.
    pub install_dir: String,
    /// Superbundles tied to this package, as relative paths.
    pub superbundles: Vec<String>,
    /// Names of packages this one depends on, resolved within the same layer.
    pub required: Vec<String>,
    /// Optional packages (typically localization) may be physically absent.
    pub optional: bool,
}

impl LayoutDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let toc = Toc::parse(data)?;
        Self::from_root(toc.root())
    }

    fn from_root(root: &DbObject) -> Result<Self> {
        let mut layout = Self::default();
        for (name, node) in root.entries() {
            match name {
                "name" => layout.name = node.as_str().map(str::to_owned),
                "superBundles" => {
                    for item in node.as_list().unwrap_or_default() {
                        let obj = item.as_object().ok_or_else(|| {
                            Error::FormatMismatch("superbundle entry is not an object".into())
                        })?;
                        layout.superbundles.push(obj.require_str("name")?.to_owned());
                    }
                }
                "installManifest" => {
                    let manifest = node.as_object().ok_or_else(|| {
                        Error::FormatMismatch("installManifest is not an object".into())
                    })?;
                    layout.packages = parse_install_chunks(manifest)?;
                }
                "chunks" => {
                    for item in node.as_list().unwrap_or_default() {
                        let obj = item.as_object().ok_or_else(|| {
                            Error::FormatMismatch("layout chunk entry is not an object".into())
                        })?;
                        layout.resources.push(parse_toc_resource(obj)?);
                    }
                }
                other => debug!("unknown layout field `{other}`"),
            }
        }
        Ok(layout)
    }
}

fn parse_install_chunks(manifest: &DbObject) -> Result<Vec<PackageDescriptor>> {
    let mut packages = Vec::new();
    for item in manifest.require_list("installChunks")? {
        let obj = item.as_object().ok_or_else(|| {
            Error::FormatMismatch("install chunk entry is not an object".into())
        })?;
        let mut package = PackageDescriptor {
            name: obj.require_str("name")?.to_owned(),
            install_dir: obj.require_str("installDir")?.to_owned(),
            optional: obj.get_bool("optional"),
            ..PackageDescriptor::default()
        };
        for node in obj.get_list("superBundles").unwrap_or_default() {
            package.superbundles.push(
                node.as_str()
                    .ok_or_else(|| {
                        Error::FormatMismatch("package superbundle path is not a string".into())
                    })?
                    .to_owned(),
            );
        }
        for node in obj.get_list("requiredChunks").unwrap_or_default() {
            package.required.push(
                node.as_str()
                    .ok_or_else(|| {
                        Error::FormatMismatch("package dependency is not a string".into())
                    })?
                    .to_owned(),
            );
        }
        packages.push(package);
    }
    Ok(packages)
}
