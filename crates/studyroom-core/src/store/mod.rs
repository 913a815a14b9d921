//! Local store implementations

mod file;
mod memory;
pub mod tables;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::config::StoreConfig;
use crate::traits::OfflineStore;

/// Open a store from configuration, degrading to memory-only when
/// persistent storage is unavailable.
///
/// Returns the store and whether it is persistent. A file store that
/// cannot be opened is not fatal: the session falls back to an in-memory
/// store, captures work for the lifetime of the process, and the
/// fallback is logged so the condition is visible.
pub async fn open(config: &StoreConfig) -> (Box<dyn OfflineStore>, bool) {
    match config {
        StoreConfig::File { path } => match FileStore::new(path).await {
            Ok(store) => (Box::new(store), true),
            Err(e) => {
                tracing::warn!(
                    "persistent storage unavailable ({}), falling back to memory-only store",
                    e
                );
                (Box::new(MemoryStore::new()), false)
            }
        },
        StoreConfig::Memory => (Box::new(MemoryStore::new()), false),
    }
}
