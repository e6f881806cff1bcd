//! The in-memory game graph
//!
//! Built once from the layout descriptors, every referenced TOC, and every
//! companion SB, then immutable: extraction only performs read-only
//! traversals. Nodes live in arenas and cross-reference each other through
//! indices, so patch bundles can point at parts defined by data bundles
//! without owning them.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use sbtoc_parser::{
    BundleRecord, CasId, ChunkPart, EbxPart, Guid, ResPart, Sha1, SuperbundleToc, TocBundleEntry,
    TocResource, resolve_bundles,
};
use tracing::{debug, info, warn};

use crate::cas_id::{CasFileKey, Layer};
use crate::config::StorageConfig;
use crate::error::Result;
use crate::layout::LayoutResolver;

/// Arena index of a superbundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SuperbundleId(usize);

/// Arena index of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BundleId(usize);

#[derive(Debug, Clone)]
pub enum SuperbundleStatus {
    Loaded,
    /// Phase-3 failures demote the superbundle instead of aborting the
    /// build; the reason is kept for diagnostics.
    Unavailable(String),
}

/// A superbundle node: a named collection of bundles, either tied to one
/// package (split) or free-standing (shared).
#[derive(Debug, Clone)]
pub struct Superbundle {
    /// Relative path under the layer root, without extension.
    pub name: String,
    /// Layer providing the superbundle after patch shadowing.
    pub layer: Layer,
    /// Owning package, `None` for shared superbundles.
    pub package: Option<(Layer, u16)>,
    pub status: SuperbundleStatus,
    pub bundles: Vec<BundleId>,
    /// Indices into the graph's TOC resource arena.
    pub resources: Vec<usize>,
}

/// A bundle node with its parts in declared order.
#[derive(Debug, Clone)]
pub struct BundleNode {
    pub superbundle: SuperbundleId,
    pub name: String,
    /// `false` when the TOC declared the bundle but its SB range was not
    /// backed by data (absent language bundles).
    pub available: bool,
    /// Inherited from the owning package; optional parts that cannot be
    /// read are skipped, not failed.
    pub optional: bool,
    pub ebx: Vec<EbxPart>,
    pub res: Vec<ResPart>,
    pub chunks: Vec<ChunkPart>,
}

/// A part declared at the layout or TOC level, outside any bundle.
#[derive(Debug, Clone)]
pub struct TocResourceNode {
    /// Where the resource was declared, for diagnostics.
    pub origin: String,
    pub resource: TocResource,
}

/// Location of a part inside the graph arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartRef {
    Ebx { bundle: BundleId, index: usize },
    Res { bundle: BundleId, index: usize },
    Chunk { bundle: BundleId, index: usize },
    TocResource { index: usize },
}

/// Borrowed view of one part.
#[derive(Debug, Clone, Copy)]
pub enum Part<'g> {
    Ebx(&'g EbxPart),
    Res(&'g ResPart),
    Chunk(&'g ChunkPart),
    TocResource(&'g TocResource),
}

impl Part<'_> {
    pub fn sha1(&self) -> Sha1 {
        match self {
            Self::Ebx(part) => part.locator.sha1,
            Self::Res(part) => part.locator.sha1,
            Self::Chunk(part) => part.locator.sha1,
            Self::TocResource(res) => res.sha1,
        }
    }

    pub fn cas_id(&self) -> CasId {
        match self {
            Self::Ebx(part) => part.locator.cas_id,
            Self::Res(part) => part.locator.cas_id,
            Self::Chunk(part) => part.locator.cas_id,
            Self::TocResource(res) => res.cas_id,
        }
    }

    pub fn offset(&self) -> u64 {
        match self {
            Self::Ebx(part) => part.locator.offset,
            Self::Res(part) => part.locator.offset,
            Self::Chunk(part) => part.locator.offset,
            Self::TocResource(res) => res.offset,
        }
    }

    pub fn compressed_size(&self) -> u64 {
        match self {
            Self::Ebx(part) => part.locator.compressed_size,
            Self::Res(part) => part.locator.compressed_size,
            Self::Chunk(part) => part.locator.compressed_size,
            Self::TocResource(res) => res.size,
        }
    }

    /// Declared uncompressed size, when the part carries one. CHUNK parts
    /// and TOC resources do not; their pipelines terminate on consumed
    /// compressed bytes instead.
    pub fn flat_size(&self) -> Option<u64> {
        match self {
            Self::Ebx(part) => Some(part.uncompressed_size),
            Self::Res(part) => Some(part.uncompressed_size),
            Self::Chunk(_) | Self::TocResource(_) => None,
        }
    }
}

/// The immutable object graph of one installation.
#[derive(Debug)]
pub struct GameGraph {
    resolver: LayoutResolver,
    superbundles: Vec<Superbundle>,
    bundles: Vec<BundleNode>,
    toc_resources: Vec<TocResourceNode>,
    /// Resources declared by the layout descriptors themselves, traversed
    /// before any superbundle.
    layout_resources: Vec<usize>,
    /// Superbundles in deterministic traversal order: Patch layer first,
    /// packages topologically, shared superbundles after.
    order: Vec<SuperbundleId>,
    by_sha1: HashMap<Sha1, PartRef>,
    by_uid: HashMap<Guid, PartRef>,
    bundle_names: HashMap<(SuperbundleId, String), BundleId>,
}

struct PendingSuperbundle {
    name: String,
    layer: Layer,
    package: Option<(Layer, u16)>,
    toc: Option<SuperbundleToc>,
    unavailable: Option<String>,
}

impl GameGraph {
    /// Build the graph: (1) parse layouts, (2) parse every referenced TOC,
    /// (3) parse every companion SB, (4) link cross-references. Errors in
    /// phases 1–2 abort; phase-3 errors demote the affected superbundle.
    pub fn build(config: &StorageConfig) -> Result<Self> {
        // Phase 1: layout descriptors.
        let resolver = LayoutResolver::open(&config.root)?;

        let mut layers = Vec::new();
        if resolver.has_patch() {
            layers.push(Layer::Patch);
        }
        layers.push(Layer::Data);

        // Phase 2: every TOC referenced by the layouts, Patch names
        // shadowing Data names.
        let mut pending = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for &layer in &layers {
            for package in resolver.topo_packages(layer) {
                for name in &package.superbundles {
                    load_superbundle_toc(
                        &resolver,
                        layer,
                        name,
                        Some((layer, package.id)),
                        package.optional,
                        &mut seen,
                        &mut pending,
                    )?;
                }
            }
            for name in resolver.shared_superbundles(layer) {
                load_superbundle_toc(&resolver, layer, name, None, false, &mut seen, &mut pending)?;
            }
        }

        let mut graph = Self {
            resolver,
            superbundles: Vec::new(),
            bundles: Vec::new(),
            toc_resources: Vec::new(),
            layout_resources: Vec::new(),
            order: Vec::new(),
            by_sha1: HashMap::new(),
            by_uid: HashMap::new(),
            bundle_names: HashMap::new(),
        };

        for &layer in &layers {
            for resource in graph.resolver.layout_resources(layer).to_vec() {
                let index = graph.toc_resources.len();
                graph.toc_resources.push(TocResourceNode {
                    origin: format!("{layer} layout"),
                    resource,
                });
                graph.layout_resources.push(index);
            }
        }

        // Phase 3: companion SB files; failures demote, never abort.
        for entry in pending {
            graph.assemble_superbundle(entry);
        }

        // Phase 4: link cross-references and validate identifiers.
        graph.link()?;

        let available = graph
            .bundles
            .iter()
            .filter(|bundle| bundle.available)
            .count();
        info!(
            "graph: {} superbundles, {} bundles ({available} available), \
             {} TOC resources, {} distinct SHA1s",
            graph.superbundles.len(),
            graph.bundles.len(),
            graph.toc_resources.len(),
            graph.by_sha1.len()
        );
        Ok(graph)
    }

    fn assemble_superbundle(&mut self, entry: PendingSuperbundle) {
        let id = SuperbundleId(self.superbundles.len());
        let mut node = Superbundle {
            name: entry.name,
            layer: entry.layer,
            package: entry.package,
            status: SuperbundleStatus::Loaded,
            bundles: Vec::new(),
            resources: Vec::new(),
        };

        let optional = entry
            .package
            .and_then(|(layer, package)| {
                self.resolver
                    .packages(layer)
                    .get(usize::from(package))
                    .map(|package| package.optional)
            })
            .unwrap_or(false);

        'load: {
            if let Some(reason) = entry.unavailable {
                node.status = SuperbundleStatus::Unavailable(reason);
                break 'load;
            }
            let Some(toc) = entry.toc else {
                break 'load;
            };

            for resource in toc.resources {
                let index = self.toc_resources.len();
                self.toc_resources.push(TocResourceNode {
                    origin: node.name.clone(),
                    resource,
                });
                node.resources.push(index);
            }

            let needs_sb = toc
                .entries
                .iter()
                .any(|entry| matches!(entry, TocBundleEntry::Ranged { .. }));
            let sb_data = if needs_sb {
                let path = self.superbundle_file(entry.layer, &node.name, "sb");
                match fs::read(&path) {
                    Ok(data) => Some(data),
                    Err(e) => {
                        warn!(
                            "superbundle `{}` has no readable SB companion \
                             ({e}), marking unavailable",
                            node.name
                        );
                        node.status = SuperbundleStatus::Unavailable(e.to_string());
                        break 'load;
                    }
                }
            } else {
                None
            };

            match resolve_bundles(toc.entries, sb_data.as_deref()) {
                Ok(records) => {
                    for record in records {
                        let bundle_id = BundleId(self.bundles.len());
                        let bundle = match record {
                            BundleRecord::Loaded(bundle) => BundleNode {
                                superbundle: id,
                                name: bundle.name,
                                available: true,
                                optional,
                                ebx: bundle.ebx,
                                res: bundle.res,
                                chunks: bundle.chunks,
                            },
                            BundleRecord::Unavailable { name } => BundleNode {
                                superbundle: id,
                                name,
                                available: false,
                                optional,
                                ebx: Vec::new(),
                                res: Vec::new(),
                                chunks: Vec::new(),
                            },
                        };
                        self.bundles.push(bundle);
                        node.bundles.push(bundle_id);
                    }
                }
                Err(e) => {
                    warn!(
                        "superbundle `{}` failed to load ({e}), marking \
                         unavailable",
                        node.name
                    );
                    node.bundles.clear();
                    node.status = SuperbundleStatus::Unavailable(e.to_string());
                }
            }
        }

        self.superbundles.push(node);
        self.order.push(id);
    }

    fn superbundle_file(&self, layer: Layer, name: &str, extension: &str) -> PathBuf {
        let mut path = self
            .resolver
            .layer_dir(layer)
            .map_or_else(PathBuf::new, PathBuf::from);
        path.push(name);
        path.set_extension(extension);
        path
    }

    fn link(&mut self) -> Result<()> {
        for (index, node) in self.toc_resources.iter().enumerate() {
            CasFileKey::decode(node.resource.cas_id)?;
            let part = PartRef::TocResource { index };
            self.by_sha1.entry(node.resource.sha1).or_insert(part);
            if let Some(uid) = node.resource.id {
                self.by_uid.entry(uid).or_insert(part);
            }
        }

        for (index, bundle) in self.bundles.iter().enumerate() {
            let bundle_id = BundleId(index);
            self.bundle_names
                .insert((bundle.superbundle, bundle.name.clone()), bundle_id);
            for (i, part) in bundle.ebx.iter().enumerate() {
                CasFileKey::decode(part.locator.cas_id)?;
                self.by_sha1.entry(part.locator.sha1).or_insert(PartRef::Ebx {
                    bundle: bundle_id,
                    index: i,
                });
            }
            for (i, part) in bundle.res.iter().enumerate() {
                CasFileKey::decode(part.locator.cas_id)?;
                self.by_sha1.entry(part.locator.sha1).or_insert(PartRef::Res {
                    bundle: bundle_id,
                    index: i,
                });
            }
            for (i, part) in bundle.chunks.iter().enumerate() {
                CasFileKey::decode(part.locator.cas_id)?;
                let part_ref = PartRef::Chunk {
                    bundle: bundle_id,
                    index: i,
                };
                self.by_sha1.entry(part.locator.sha1).or_insert(part_ref);
                self.by_uid.entry(part.id).or_insert(part_ref);
            }
        }
        Ok(())
    }

    pub fn resolver(&self) -> &LayoutResolver {
        &self.resolver
    }

    /// Resolve a CAS identifier to the concrete archive path, with patch
    /// shadowing applied.
    pub fn resolve_cas(&self, id: CasId) -> Result<PathBuf> {
        self.resolver.resolve(id).map(|resolved| resolved.path)
    }

    /// Superbundles in deterministic traversal order.
    pub fn superbundles(&self) -> impl Iterator<Item = (SuperbundleId, &Superbundle)> {
        self.order
            .iter()
            .map(move |&id| (id, &self.superbundles[id.0]))
    }

    pub fn superbundle(&self, id: SuperbundleId) -> &Superbundle {
        &self.superbundles[id.0]
    }

    pub fn bundle(&self, id: BundleId) -> &BundleNode {
        &self.bundles[id.0]
    }

    /// All bundles with their ids, in arena (traversal) order.
    pub fn bundles(&self) -> impl Iterator<Item = (BundleId, &BundleNode)> {
        self.bundles
            .iter()
            .enumerate()
            .map(|(index, bundle)| (BundleId(index), bundle))
    }

    pub fn bundle_by_name(&self, superbundle: SuperbundleId, name: &str) -> Option<BundleId> {
        self.bundle_names
            .get(&(superbundle, name.to_owned()))
            .copied()
    }

    /// Superbundles tied to one package.
    pub fn superbundles_for_package(
        &self,
        layer: Layer,
        package: u16,
    ) -> impl Iterator<Item = (SuperbundleId, &Superbundle)> {
        self.superbundles()
            .filter(move |(_, sb)| sb.package == Some((layer, package)))
    }

    /// Bundles of every superbundle tied to one package.
    pub fn package_bundles(
        &self,
        layer: Layer,
        package: u16,
    ) -> impl Iterator<Item = (BundleId, &BundleNode)> {
        self.superbundles_for_package(layer, package)
            .flat_map(move |(_, sb)| sb.bundles.iter().map(move |&id| (id, &self.bundles[id.0])))
    }

    pub fn part(&self, part: PartRef) -> Part<'_> {
        match part {
            PartRef::Ebx { bundle, index } => Part::Ebx(&self.bundles[bundle.0].ebx[index]),
            PartRef::Res { bundle, index } => Part::Res(&self.bundles[bundle.0].res[index]),
            PartRef::Chunk { bundle, index } => Part::Chunk(&self.bundles[bundle.0].chunks[index]),
            PartRef::TocResource { index } => {
                Part::TocResource(&self.toc_resources[index].resource)
            }
        }
    }

    pub fn part_by_sha1(&self, sha1: &Sha1) -> Option<Part<'_>> {
        self.by_sha1.get(sha1).map(|&part| self.part(part))
    }

    pub fn part_by_uid(&self, uid: &Guid) -> Option<Part<'_>> {
        self.by_uid.get(uid).map(|&part| self.part(part))
    }

    /// Diagnostics origin of a part: its bundle and superbundle names, when
    /// it has them.
    pub fn part_origin(&self, part: PartRef) -> (Option<&str>, Option<&str>) {
        match part {
            PartRef::Ebx { bundle, .. }
            | PartRef::Res { bundle, .. }
            | PartRef::Chunk { bundle, .. } => {
                let bundle = &self.bundles[bundle.0];
                let superbundle = &self.superbundles[bundle.superbundle.0];
                (Some(bundle.name.as_str()), Some(superbundle.name.as_str()))
            }
            PartRef::TocResource { index } => {
                (None, Some(self.toc_resources[index].origin.as_str()))
            }
        }
    }

    /// Whether the part may legitimately be missing from disk.
    pub fn part_is_optional(&self, part: PartRef) -> bool {
        match part {
            PartRef::Ebx { bundle, .. }
            | PartRef::Res { bundle, .. }
            | PartRef::Chunk { bundle, .. } => self.bundles[bundle.0].optional,
            PartRef::TocResource { .. } => false,
        }
    }

    /// Every part in deterministic extraction order: layout resources,
    /// then per superbundle its TOC resources and bundles, parts within a
    /// bundle in EBX, RES, CHUNKS declared order.
    pub fn ordered_parts(&self) -> Vec<PartRef> {
        let mut out = Vec::new();
        for &index in &self.layout_resources {
            out.push(PartRef::TocResource { index });
        }
        for &sb_id in &self.order {
            let sb = &self.superbundles[sb_id.0];
            for &index in &sb.resources {
                out.push(PartRef::TocResource { index });
            }
            for &bundle_id in &sb.bundles {
                let bundle = &self.bundles[bundle_id.0];
                for index in 0..bundle.ebx.len() {
                    out.push(PartRef::Ebx {
                        bundle: bundle_id,
                        index,
                    });
                }
                for index in 0..bundle.res.len() {
                    out.push(PartRef::Res {
                        bundle: bundle_id,
                        index,
                    });
                }
                for index in 0..bundle.chunks.len() {
                    out.push(PartRef::Chunk {
                        bundle: bundle_id,
                        index,
                    });
                }
            }
        }
        out
    }
}

#[allow(clippy::too_many_arguments)]
fn load_superbundle_toc(
    resolver: &LayoutResolver,
    layer: Layer,
    name: &str,
    package: Option<(Layer, u16)>,
    optional: bool,
    seen: &mut HashSet<String>,
    pending: &mut Vec<PendingSuperbundle>,
) -> Result<()> {
    if !seen.insert(name.to_owned()) {
        debug!("superbundle `{name}` already provided by a higher layer");
        return Ok(());
    }
    let Some(dir) = resolver.layer_dir(layer) else {
        return Ok(());
    };
    let mut path = dir.join(name);
    path.set_extension("toc");

    match fs::read(&path) {
        Ok(raw) => {
            let toc = SuperbundleToc::parse(&raw)?;
            pending.push(PendingSuperbundle {
                name: name.to_owned(),
                layer,
                package,
                toc: Some(toc),
                unavailable: None,
            });
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && optional => {
            warn!("optional superbundle `{name}` has no TOC, marking unavailable");
            pending.push(PendingSuperbundle {
                name: name.to_owned(),
                layer,
                package,
                toc: None,
                unavailable: Some(format!("TOC absent: {}", path.display())),
            });
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
