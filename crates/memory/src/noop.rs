//! No-op memory backend: disables memory entirely.

use async_trait::async_trait;
use autolite_core::error::MemoryError;
use autolite_core::memory::{MemoryBackend, MemoryStats};

/// A memory backend that stores nothing and remembers nothing.
pub struct NoMemory;

#[async_trait]
impl MemoryBackend for NoMemory {
    fn name(&self) -> &str { "no_memory" }

    async fn add(&self, text: &str) -> Result<String, MemoryError> {
        Ok(text.to_string())
    }

    async fn get_relevant(&self, _query: &str, _k: usize) -> Result<Vec<String>, MemoryError> {
        Ok(Vec::new())
    }

    async fn clear(&self) -> Result<String, MemoryError> {
        Ok("Memory cleared".into())
    }

    async fn stats(&self) -> MemoryStats {
        MemoryStats { records: 0, shape: (0, 0) }
    }
}
