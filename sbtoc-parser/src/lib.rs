//! Parser for Frostbite superbundle containers
//!
//! This crate decodes the three interlocking pieces of metadata the engine
//! ships a title with: TOC files (table-of-contents, including the per-layer
//! layout descriptor), companion SB files holding bundle bodies, and the
//! self-describing DbObject tag stream embedded in both. The compressed
//! payloads these structures point at live in CAS archives and are handled
//! elsewhere.

pub mod dbobject;
pub mod error;
pub mod reader;
pub mod superbundle;
#[cfg(test)]
mod testutil;
pub mod toc;
pub mod types;

pub use error::{Error, Result};
pub use reader::FbReader;
pub use superbundle::{BundleRecord, SuperbundleToc, TocBundleEntry, resolve_bundles};
pub use toc::{LayoutDescriptor, PackageDescriptor, Toc};
pub use types::{
    Bundle, CasId, ChunkPart, EbxPart, Guid, PartLocator, ResPart, Sha1, TocResource,
};
