//! Extraction driver
//!
//! Walks the graph in deterministic order, reads each part through the CAS
//! reader, and hands the bytes plus metadata to an output sink. Extraction
//! is embarrassingly parallel across parts; the graph and the CAS reader are
//! the shared read-only substrate.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use fbchunk::Decompressor;
use rayon::prelude::*;
use sbtoc_parser::{Guid, Sha1};
use tracing::{debug, info, warn};

use crate::cas::CasReader;
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::graph::{GameGraph, Part, PartRef};

/// The four part categories delivered to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Ebx,
    Res,
    Chunk,
    TocResource,
}

/// Which part kinds an extraction run covers.
#[derive(Debug, Clone, Copy)]
pub struct PartKindSet {
    pub ebx: bool,
    pub res: bool,
    pub chunks: bool,
    pub toc_resources: bool,
}

impl PartKindSet {
    pub fn all() -> Self {
        Self {
            ebx: true,
            res: true,
            chunks: true,
            toc_resources: true,
        }
    }

    fn contains(self, kind: PartKind) -> bool {
        match kind {
            PartKind::Ebx => self.ebx,
            PartKind::Res => self.res,
            PartKind::Chunk => self.chunks,
            PartKind::TocResource => self.toc_resources,
        }
    }
}

impl Default for PartKindSet {
    fn default() -> Self {
        Self::all()
    }
}

/// Options for one extraction run.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Worker pool width. `None` uses the available hardware parallelism.
    pub workers: Option<usize>,
    /// Deliver each SHA1 only once; parts sharing a SHA1 are byte-identical.
    pub dedup: bool,
    /// Part kinds to extract.
    pub kinds: PartKindSet,
    /// Cooperative cancellation flag, polled between parts.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Identity of a delivered part: logical path for EBX and RES, UID for
/// chunks, SHA1 for TOC resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartIdentity<'a> {
    Path(&'a str),
    Uid(&'a Guid),
    Sha1(&'a Sha1),
}

/// Metadata accompanying a delivered part.
#[derive(Debug, Clone, Copy)]
pub struct PartMetadata<'a> {
    pub sha1: Sha1,
    pub flags: u32,
    /// RES content-type code, for RES parts.
    pub res_type: Option<u32>,
    /// Opaque meta blob of RES and CHUNK parts, carried verbatim.
    pub meta: Option<&'a [u8]>,
    /// Owning bundle, when the part has one.
    pub bundle: Option<&'a str>,
    /// Owning superbundle, or the layout that declared a TOC resource.
    pub origin: Option<&'a str>,
}

/// One extracted part, handed to the sink.
#[derive(Debug)]
pub struct ExtractedItem<'a> {
    pub kind: PartKind,
    pub identity: PartIdentity<'a>,
    pub metadata: PartMetadata<'a>,
    pub bytes: &'a [u8],
}

/// Receives extracted parts. Implementations decide the filesystem layout
/// (or whatever else happens to the bytes); the core mandates none. Called
/// from multiple workers concurrently.
pub trait OutputSink: Send + Sync {
    fn deliver(&self, item: &ExtractedItem<'_>) -> std::io::Result<()>;
}

/// Outcome counters of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub extracted: u64,
    pub skipped_unavailable: u64,
    pub failed: u64,
}

/// Walks the graph and extracts parts through a CAS reader.
pub struct Extractor<'g> {
    graph: &'g GameGraph,
    cas: CasReader<'g>,
}

impl<'g> Extractor<'g> {
    pub fn new(
        graph: &'g GameGraph,
        decompressor: &'g dyn Decompressor,
        config: &StorageConfig,
    ) -> Self {
        Self {
            graph,
            cas: CasReader::new(graph.resolver(), decompressor, config.handle_cache_size),
        }
    }

    /// Run one extraction. Work is enqueued in the graph's deterministic
    /// order; output ordering across parts is not guaranteed.
    pub fn run(&self, sink: &dyn OutputSink, options: &ExtractOptions) -> Result<ExtractSummary> {
        let work = self.collect_work(options);
        info!("extracting {} parts", work.len());

        let width = options.workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        });
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(width)
            .build()
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        let extracted = AtomicU64::new(0);
        let skipped = AtomicU64::new(0);
        let failed = AtomicU64::new(0);

        pool.install(|| {
            work.par_iter().for_each(|&part| {
                if let Some(cancel) = &options.cancel {
                    if cancel.load(Ordering::Relaxed) {
                        return;
                    }
                }
                match self.extract_one(part, sink) {
                    Ok(()) => {
                        extracted.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) if e.is_unavailable() => {
                        let (bundle, origin) = self.graph.part_origin(part);
                        warn!(
                            "skipping part in {:?}/{:?}: {e}",
                            origin.unwrap_or("?"),
                            bundle.unwrap_or("?")
                        );
                        skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        let (bundle, origin) = self.graph.part_origin(part);
                        warn!(
                            "part in {:?}/{:?} failed: {e}",
                            origin.unwrap_or("?"),
                            bundle.unwrap_or("?")
                        );
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        });

        let summary = ExtractSummary {
            extracted: extracted.into_inner(),
            skipped_unavailable: skipped.into_inner(),
            failed: failed.into_inner(),
        };
        info!(
            "extraction done: {} extracted, {} skipped unavailable, {} failed",
            summary.extracted, summary.skipped_unavailable, summary.failed
        );
        Ok(summary)
    }

    /// The deterministic work list: graph order, filtered by kind, deduped
    /// by SHA1 when requested.
    fn collect_work(&self, options: &ExtractOptions) -> Vec<PartRef> {
        let mut seen: HashSet<Sha1> = HashSet::new();
        let mut work = Vec::new();
        for part in self.graph.ordered_parts() {
            let view = self.graph.part(part);
            if !options.kinds.contains(kind_of(&view)) {
                continue;
            }
            if options.dedup && !seen.insert(view.sha1()) {
                debug!("deduplicating part with SHA1 {}", view.sha1());
                continue;
            }
            work.push(part);
        }
        work
    }

    fn extract_one(&self, part: PartRef, sink: &dyn OutputSink) -> Result<()> {
        let view = self.graph.part(part);
        let bytes = self.cas.read(
            view.cas_id(),
            view.offset(),
            view.compressed_size(),
            view.flat_size(),
        )?;

        let (bundle, origin) = self.graph.part_origin(part);
        let item = match view {
            Part::Ebx(ebx) => ExtractedItem {
                kind: PartKind::Ebx,
                identity: PartIdentity::Path(&ebx.name),
                metadata: PartMetadata {
                    sha1: ebx.locator.sha1,
                    flags: ebx.locator.flags,
                    res_type: None,
                    meta: None,
                    bundle,
                    origin,
                },
                bytes: &bytes,
            },
            Part::Res(res) => ExtractedItem {
                kind: PartKind::Res,
                identity: PartIdentity::Path(&res.name),
                metadata: PartMetadata {
                    sha1: res.locator.sha1,
                    flags: res.locator.flags,
                    res_type: Some(res.res_type),
                    meta: Some(&res.res_meta),
                    bundle,
                    origin,
                },
                bytes: &bytes,
            },
            Part::Chunk(chunk) => ExtractedItem {
                kind: PartKind::Chunk,
                identity: PartIdentity::Uid(&chunk.id),
                metadata: PartMetadata {
                    sha1: chunk.locator.sha1,
                    flags: chunk.locator.flags,
                    res_type: None,
                    meta: Some(&chunk.meta),
                    bundle,
                    origin,
                },
                bytes: &bytes,
            },
            Part::TocResource(resource) => ExtractedItem {
                kind: PartKind::TocResource,
                identity: PartIdentity::Sha1(&resource.sha1),
                metadata: PartMetadata {
                    sha1: resource.sha1,
                    flags: 0,
                    res_type: None,
                    meta: None,
                    bundle,
                    origin,
                },
                bytes: &bytes,
            },
        };
        sink.deliver(&item)?;
        Ok(())
    }
}

fn kind_of(part: &Part<'_>) -> PartKind {
    match part {
        Part::Ebx(_) => PartKind::Ebx,
        Part::Res(_) => PartKind::Res,
        Part::Chunk(_) => PartKind::Chunk,
        Part::TocResource(_) => PartKind::TocResource,
    }
}
