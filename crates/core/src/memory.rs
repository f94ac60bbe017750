//! Memory trait: the agent's long-term recall.
//!
//! Memories are plain texts stored next to an embedding. Retrieval is by
//! similarity to a query text; there is no update or delete of individual
//! entries, only append and whole-store clear.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// Marker that identifies failed command output. Texts containing it are
/// never stored.
pub const ERROR_MARKER: &str = "Command Error:";

/// Size of a memory store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Number of stored texts
    pub records: usize,

    /// Shape of the embedding matrix as `(rows, dimensions)`
    pub shape: (usize, usize),
}

/// The core MemoryBackend trait.
///
/// Implementations: local JSON-backed vector cache, no-op.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// The backend name (e.g., "local", "no_memory").
    fn name(&self) -> &str;

    /// Store a text. Returns the text as stored (or as skipped).
    async fn add(&self, text: &str) -> std::result::Result<String, MemoryError>;

    /// Return up to `k` stored texts most similar to `query`, best first.
    async fn get_relevant(&self, query: &str, k: usize) -> std::result::Result<Vec<String>, MemoryError>;

    /// Remove every memory. Returns a status line.
    async fn clear(&self) -> std::result::Result<String, MemoryError>;

    async fn stats(&self) -> MemoryStats;
}
