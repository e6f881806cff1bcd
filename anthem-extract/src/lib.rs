//! Asset extraction core for Anthem game data
//!
//! Opens a game installation (Data layer plus optional Patch layer), builds
//! the immutable graph of packages, superbundles, bundles and parts, and
//! extracts decompressed asset bytes through a pluggable output sink. The
//! container formats themselves are parsed by `sbtoc-parser`; compressed
//! payloads go through `fbchunk`.

pub mod cas;
pub mod cas_id;
pub mod config;
pub mod error;
pub mod extract;
pub mod graph;
pub mod layout;

pub use cas::CasReader;
pub use cas_id::{CasFileKey, Layer};
pub use config::StorageConfig;
pub use error::{Error, Result};
pub use extract::{
    ExtractOptions, ExtractSummary, ExtractedItem, Extractor, OutputSink, PartIdentity, PartKind,
    PartKindSet, PartMetadata,
};
pub use graph::{
    BundleId, BundleNode, GameGraph, Part, PartRef, Superbundle, SuperbundleId, SuperbundleStatus,
};
pub use layout::{LayoutResolver, Package, ResolvedCas};

// Re-exported so sinks and callers can name part record types without
// depending on the parser crate directly.
pub use sbtoc_parser::{Bundle, CasId, ChunkPart, EbxPart, Guid, ResPart, Sha1, TocResource};
