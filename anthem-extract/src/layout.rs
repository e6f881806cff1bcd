//! Layout descriptor parsing and CAS path resolution
//!
//! Each layer root carries a `layout.toc` enumerating the layer's
//! installation packages and free-standing superbundles. Package list order
//! defines the package id used inside CAS identifiers; the resolver scans
//! each package's install directory for `cas_NN.cas` archives and maps
//! decoded identifiers to concrete paths, with the Patch layer shadowing
//! Data by package name.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use sbtoc_parser::{CasId, LayoutDescriptor, TocResource};
use tracing::{debug, info, warn};

use crate::cas_id::{CasFileKey, Layer};
use crate::error::{Error, Result};

/// One installation package of a layer, with its dependencies resolved to
/// package ids.
#[derive(Debug, Clone)]
pub struct Package {
    pub layer: Layer,
    pub id: u16,
    pub name: String,
    /// Directory holding the package's CAS archives, relative to the layer
    /// root.
    pub install_dir: PathBuf,
    /// Superbundles tied to this package, as relative paths.
    pub superbundles: Vec<String>,
    /// Ids of same-layer packages this one depends on.
    pub required: Vec<u16>,
    /// Optional packages (typically localization) may be physically absent.
    pub optional: bool,
}

#[derive(Debug)]
struct LayerState {
    dir: PathBuf,
    packages: Vec<Package>,
    package_by_name: HashMap<String, u16>,
    /// (package id, cas index) -> absolute archive path, from the install
    /// directory scan.
    cas_paths: HashMap<(u16, u8), PathBuf>,
    /// Free-standing superbundles of the layer.
    superbundles: Vec<String>,
    /// Parts declared at the layout level.
    resources: Vec<TocResource>,
    /// Package ids in dependency-topological order.
    topo: Vec<u16>,
}

/// A CAS identifier resolved to a concrete archive, after patch shadowing.
#[derive(Debug, Clone)]
pub struct ResolvedCas {
    pub key: CasFileKey,
    pub path: PathBuf,
}

/// Parsed layouts of both layers plus the identifier-to-path maps.
#[derive(Debug)]
pub struct LayoutResolver {
    data: LayerState,
    patch: Option<LayerState>,
}

impl LayoutResolver {
    /// Parse the layout descriptors under `root`. The Data layer is
    /// mandatory; the Patch layer is loaded when its descriptor exists.
    pub fn open(root: &Path) -> Result<Self> {
        let data = load_layer(root, Layer::Data)?;
        let patch_toc = root.join(Layer::Patch.dir_name()).join("layout.toc");
        let patch = if patch_toc.is_file() {
            Some(load_layer(root, Layer::Patch)?)
        } else {
            None
        };

        info!(
            "layout: {} Data packages, {}",
            data.packages.len(),
            patch
                .as_ref()
                .map_or_else(|| "no Patch layer".to_owned(), |p| format!(
                    "{} Patch packages",
                    p.packages.len()
                ))
        );
        Ok(Self { data, patch })
    }

    fn layer_state(&self, layer: Layer) -> Option<&LayerState> {
        match layer {
            Layer::Data => Some(&self.data),
            Layer::Patch => self.patch.as_ref(),
        }
    }

    pub fn has_patch(&self) -> bool {
        self.patch.is_some()
    }

    /// Packages of a layer in declared (package id) order.
    pub fn packages(&self, layer: Layer) -> &[Package] {
        self.layer_state(layer)
            .map_or(&[], |state| state.packages.as_slice())
    }

    /// Packages of a layer in dependency-topological order: dependencies
    /// before dependents.
    pub fn topo_packages(&self, layer: Layer) -> impl Iterator<Item = &Package> {
        self.layer_state(layer)
            .map(|state| {
                state
                    .topo
                    .iter()
                    .map(move |&id| &state.packages[usize::from(id)])
            })
            .into_iter()
            .flatten()
    }

    pub fn package_id(&self, layer: Layer, name: &str) -> Option<u16> {
        self.layer_state(layer)?.package_by_name.get(name).copied()
    }

    /// Free-standing superbundles declared by a layer.
    pub fn shared_superbundles(&self, layer: Layer) -> &[String] {
        self.layer_state(layer)
            .map_or(&[], |state| state.superbundles.as_slice())
    }

    /// Parts declared at a layer's layout level.
    pub fn layout_resources(&self, layer: Layer) -> &[TocResource] {
        self.layer_state(layer)
            .map_or(&[], |state| state.resources.as_slice())
    }

    /// Directory of a layer under the game root.
    pub fn layer_dir(&self, layer: Layer) -> Option<&Path> {
        self.layer_state(layer).map(|state| state.dir.as_path())
    }

    /// Archive path for an exact (layer, package, index) tuple, without
    /// shadowing.
    pub fn cas_path(&self, key: CasFileKey) -> Option<&Path> {
        self.layer_state(key.layer)?
            .cas_paths
            .get(&(key.package, key.index))
            .map(PathBuf::as_path)
    }

    /// Resolve a CAS identifier to a concrete archive file. Patch-layer
    /// paths shadow Data-layer paths for the same package name and index;
    /// absence in both layers is [`Error::BundleUnavailable`].
    pub fn resolve(&self, id: CasId) -> Result<ResolvedCas> {
        let key = CasFileKey::decode(id)?;
        let origin = self.layer_state(key.layer).ok_or_else(|| {
            Error::BundleUnavailable(format!(
                "CAS identifier {id} references the absent {} layer",
                key.layer
            ))
        })?;
        let package = origin
            .packages
            .get(usize::from(key.package))
            .ok_or_else(|| {
                Error::FormatMismatch(format!(
                    "CAS identifier {id} names package {} outside the {} layer's \
                     {}-entry package list",
                    key.package,
                    key.layer,
                    origin.packages.len()
                ))
            })?;

        // Patch takes precedence for the same package name.
        if let Some(patch) = &self.patch {
            if let Some(&patch_package) = patch.package_by_name.get(&package.name) {
                if let Some(path) = patch.cas_paths.get(&(patch_package, key.index)) {
                    debug!("patch shadows {key}: {}", path.display());
                    return Ok(ResolvedCas {
                        key: CasFileKey {
                            layer: Layer::Patch,
                            package: patch_package,
                            index: key.index,
                        },
                        path: path.clone(),
                    });
                }
            }
        }

        if let Some(path) = origin.cas_paths.get(&(key.package, key.index)) {
            return Ok(ResolvedCas {
                key,
                path: path.clone(),
            });
        }

        // A patch identifier may still point at unchanged data-layer content.
        if key.layer == Layer::Patch {
            if let Some(&data_package) = self.data.package_by_name.get(&package.name) {
                if let Some(path) = self.data.cas_paths.get(&(data_package, key.index)) {
                    return Ok(ResolvedCas {
                        key: CasFileKey {
                            layer: Layer::Data,
                            package: data_package,
                            index: key.index,
                        },
                        path: path.clone(),
                    });
                }
            }
        }

        Err(Error::BundleUnavailable(format!(
            "no CAS file for {id} ({key}, package `{}`)",
            package.name
        )))
    }
}

fn load_layer(root: &Path, layer: Layer) -> Result<LayerState> {
    let dir = root.join(layer.dir_name());
    let toc_path = dir.join("layout.toc");
    debug!("parsing layout descriptor {}", toc_path.display());
    let raw = fs::read(&toc_path)?;
    let descriptor = LayoutDescriptor::parse(&raw)?;

    if descriptor.packages.len() > usize::from(u16::MAX) + 1 {
        return Err(Error::FormatMismatch(format!(
            "{layer} layer declares {} packages, exceeding the identifier \
             package field",
            descriptor.packages.len()
        )));
    }

    let mut packages = Vec::with_capacity(descriptor.packages.len());
    let mut package_by_name = HashMap::new();
    for (id, desc) in descriptor.packages.iter().enumerate() {
        let id = id as u16;
        if package_by_name.insert(desc.name.clone(), id).is_some() {
            return Err(Error::FormatMismatch(format!(
                "package name `{}` appears twice in the {layer} layer",
                desc.name
            )));
        }
        packages.push(Package {
            layer,
            id,
            name: desc.name.clone(),
            install_dir: PathBuf::from(&desc.install_dir),
            superbundles: desc.superbundles.clone(),
            required: Vec::new(),
            optional: desc.optional,
        });
    }

    // Dependency names resolve within the layer; they are diagnostics and
    // traversal-order input, not read-time constraints.
    for (package, desc) in packages.iter_mut().zip(&descriptor.packages) {
        for name in &desc.required {
            match package_by_name.get(name) {
                Some(&dep) => package.required.push(dep),
                None => warn!(
                    "package `{}` requires unknown package `{name}` in the \
                     {layer} layer",
                    package.name
                ),
            }
        }
    }

    let mut cas_paths = HashMap::new();
    for package in &packages {
        scan_cas_files(&dir.join(&package.install_dir), package, &mut cas_paths)?;
    }

    let topo = topo_order(&packages);

    Ok(LayerState {
        dir,
        packages,
        package_by_name,
        cas_paths,
        superbundles: descriptor.superbundles,
        resources: descriptor.resources,
        topo,
    })
}

fn scan_cas_files(
    dir: &Path,
    package: &Package,
    cas_paths: &mut HashMap<(u16, u8), PathBuf>,
) -> Result<()> {
    if !dir.is_dir() {
        debug!(
            "package `{}` install directory {} is absent",
            package.name,
            dir.display()
        );
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(index) = parse_cas_index(name) else {
            continue;
        };
        if index == 0 || index > u32::from(u8::MAX) {
            return Err(Error::FormatMismatch(format!(
                "archive {} overflows the identifier index field",
                path.display()
            )));
        }
        cas_paths.insert((package.id, index as u8), path);
    }
    Ok(())
}

/// Archive file index from a `cas_NN.cas` name; `None` for anything else.
fn parse_cas_index(name: &str) -> Option<u32> {
    name.strip_prefix("cas_")?
        .strip_suffix(".cas")?
        .parse()
        .ok()
}

/// Kahn's algorithm over the same-layer dependency edges, ties broken by
/// package id for a deterministic order.
fn topo_order(packages: &[Package]) -> Vec<u16> {
    let count = packages.len();
    let mut indegree = vec![0usize; count];
    let mut dependents: Vec<Vec<u16>> = vec![Vec::new(); count];
    for package in packages {
        for &dep in &package.required {
            indegree[usize::from(package.id)] += 1;
            dependents[usize::from(dep)].push(package.id);
        }
    }

    let mut ready: BTreeSet<u16> = indegree
        .iter()
        .enumerate()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(id, _)| id as u16)
        .collect();
    let mut order = Vec::with_capacity(count);
    while let Some(id) = ready.pop_first() {
        order.push(id);
        for &dependent in &dependents[usize::from(id)] {
            indegree[usize::from(dependent)] -= 1;
            if indegree[usize::from(dependent)] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != count {
        warn!("package dependency cycle; remaining packages keep declared order");
        let placed: BTreeSet<u16> = order.iter().copied().collect();
        order.extend((0..count as u16).filter(|id| !placed.contains(id)));
    }
    order
}
