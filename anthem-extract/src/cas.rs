//! CAS archive reading
//!
//! Archives have no header; they are concatenations of chunk streams
//! addressed by absolute offset. The reader keeps a small synchronized LRU
//! of open handles keyed by the resolved (layer, package, index) tuple and
//! feeds byte ranges through the decompression pipeline.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::sync::Arc;

use fbchunk::{Decompressor, decompress_stream};
use lru::LruCache;
use parking_lot::Mutex;
use sbtoc_parser::CasId;
use tracing::debug;

use crate::cas_id::CasFileKey;
use crate::error::{Error, Result};
use crate::layout::LayoutResolver;

pub struct CasReader<'a> {
    resolver: &'a LayoutResolver,
    decompressor: &'a dyn Decompressor,
    handles: Mutex<LruCache<CasFileKey, Arc<Mutex<File>>>>,
}

impl<'a> CasReader<'a> {
    pub fn new(
        resolver: &'a LayoutResolver,
        decompressor: &'a dyn Decompressor,
        handle_cache_size: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(handle_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            resolver,
            decompressor,
            handles: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Read and decompress one part's byte range.
    ///
    /// `flat_size` is the declared uncompressed size when the part carries
    /// one (EBX and RES); `None` switches the pipeline to its
    /// consumed-compressed-bytes termination (CHUNK parts and TOC
    /// resources).
    pub fn read(
        &self,
        id: CasId,
        offset: u64,
        compressed_size: u64,
        flat_size: Option<u64>,
    ) -> Result<Vec<u8>> {
        let resolved = self.resolver.resolve(id)?;
        let handle = self.handle(resolved.key, &resolved.path)?;

        let mut compressed = vec![0u8; compressed_size as usize];
        {
            let mut file = handle.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut compressed)?;
        }

        let flat = decompress_stream(&compressed, flat_size, self.decompressor)?;
        Ok(flat)
    }

    fn handle(&self, key: CasFileKey, path: &std::path::Path) -> Result<Arc<Mutex<File>>> {
        let mut cache = self.handles.lock();
        if let Some(handle) = cache.get(&key) {
            return Ok(Arc::clone(handle));
        }
        debug!("opening CAS archive {}", path.display());
        let file = File::open(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                // The archive vanished between the layout scan and this read.
                Error::BundleUnavailable(format!("CAS archive {} is gone", path.display()))
            } else {
                Error::Io(e)
            }
        })?;
        let handle = Arc::new(Mutex::new(file));
        cache.put(key, Arc::clone(&handle));
        Ok(handle)
    }
}

impl std::fmt::Debug for CasReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasReader").finish_non_exhaustive()
    }
}
