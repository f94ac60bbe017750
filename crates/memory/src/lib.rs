//! Memory system implementations for AutoLite.

pub mod hash_embedder;
pub mod local_cache;
pub mod noop;
pub mod vector;

pub use hash_embedder::HashEmbedder;
pub use local_cache::{CacheContent, LocalCache};
pub use noop::NoMemory;
pub use vector::{dot_product, top_k};

use std::path::PathBuf;
use std::sync::Arc;

use autolite_core::memory::MemoryBackend;
use autolite_core::provider::Embedder;

/// Build the configured backend: `"local"` (JSON snapshot at `path`) or
/// `"no_memory"`. Unknown names fall back to `"local"`.
pub fn create_backend(backend: &str, path: PathBuf, embedder: Arc<dyn Embedder>) -> Arc<dyn MemoryBackend> {
    match backend {
        "no_memory" => Arc::new(NoMemory),
        "local" => Arc::new(LocalCache::new(path, embedder)),
        other => {
            tracing::warn!(backend = other, "Unknown memory backend, using local");
            Arc::new(LocalCache::new(path, embedder))
        }
    }
}
