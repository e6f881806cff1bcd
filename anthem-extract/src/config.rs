//! Configuration for opening a game installation

use std::path::PathBuf;

/// Where the game data lives and how it is accessed.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Game root containing the `Data` layer and, when patched, the `Patch`
    /// layer.
    pub root: PathBuf,
    /// Maximum number of CAS file handles kept open at once.
    pub handle_cache_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            handle_cache_size: 16,
        }
    }
}
