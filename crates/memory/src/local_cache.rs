//! Local vector cache: an append-only embedding store persisted as JSON.
//!
//! The whole store lives in memory as two parallel arrays and is rewritten
//! to disk after every append:
//!
//! ```json
//! {"texts": ["..."], "embeddings": [[0.1, 0.2, ...]]}
//! ```
//!
//! Row `i` of `embeddings` is the embedding of `texts[i]`. Every row has the
//! store's fixed dimensionality. A snapshot that breaks either rule is
//! discarded on load.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use autolite_core::error::MemoryError;
use autolite_core::memory::{ERROR_MARKER, MemoryBackend, MemoryStats};
use autolite_core::provider::Embedder;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::vector::top_k;

/// The persisted shape of the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheContent {
    #[serde(default)]
    pub texts: Vec<String>,
    #[serde(default)]
    pub embeddings: Vec<Vec<f32>>,
}

impl CacheContent {
    fn is_consistent(&self, dimensions: usize) -> bool {
        self.texts.len() == self.embeddings.len() && self.embeddings.iter().all(|row| row.len() == dimensions)
    }
}

/// JSON-file-backed vector memory.
///
/// Appends and reads share one lock, so a reader never sees a text without
/// its embedding and two appends never interleave their file writes.
pub struct LocalCache {
    path: PathBuf,
    dimensions: usize,
    embedder: Arc<dyn Embedder>,
    data: Mutex<CacheContent>,
}

impl LocalCache {
    /// Open the store at `path`.
    ///
    /// Never fails: a missing, empty, or unreadable snapshot yields an empty
    /// store (the file is created on first write).
    pub fn new(path: PathBuf, embedder: Arc<dyn Embedder>) -> Self {
        let dimensions = embedder.dimensions();
        let data = Self::load_from_disk(&path, dimensions);
        debug!(path = %path.display(), records = data.texts.len(), dimensions, "Local memory loaded");
        Self {
            path,
            dimensions,
            embedder,
            data: Mutex::new(data),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A copy of the current contents.
    pub async fn snapshot(&self) -> CacheContent {
        self.data.lock().await.clone()
    }

    fn load_from_disk(path: &Path, dimensions: usize) -> CacheContent {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "Memory file not found, starting with an empty store");
                return CacheContent::default();
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read memory file, starting with an empty store");
                return CacheContent::default();
            }
        };

        if raw.trim().is_empty() {
            warn!(path = %path.display(), "Memory file is empty, starting with an empty store");
            return CacheContent::default();
        }

        let content: CacheContent = match serde_json::from_str(&raw) {
            Ok(content) => content,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Memory file is not valid JSON, starting with an empty store");
                return CacheContent::default();
            }
        };

        if !content.is_consistent(dimensions) {
            error!(
                path = %path.display(),
                texts = content.texts.len(),
                rows = content.embeddings.len(),
                dimensions,
                "Memory file has an inconsistent shape, starting with an empty store"
            );
            return CacheContent::default();
        }

        content
    }

    /// Sibling file the snapshot is staged in before it replaces the original.
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "memory.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Rewrite the snapshot. Called with the lock held. The new content is
    /// written to a staging file and renamed over the old one, so readers
    /// only ever see a complete snapshot.
    fn persist(&self, content: &CacheContent) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| MemoryError::Storage(format!("Failed to create memory directory: {e}")))?;
        }

        let json = serde_json::to_string(content)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize memory: {e}")))?;

        let staging = self.staging_path();
        std::fs::write(&staging, json)
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))?;
        std::fs::rename(&staging, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&staging);
            MemoryError::Storage(format!("Failed to replace memory file: {e}"))
        })
    }

    async fn embed_checked(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let embedding = self.embedder.embed(&text.replace('\n', " ")).await?;
        if embedding.len() != self.dimensions {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }
}

#[async_trait]
impl MemoryBackend for LocalCache {
    fn name(&self) -> &str {
        "local"
    }

    async fn add(&self, text: &str) -> Result<String, MemoryError> {
        if text.contains(ERROR_MARKER) {
            debug!("Skipping command error output");
            return Ok(text.to_string());
        }

        let embedding = self.embed_checked(text).await?;

        let mut data = self.data.lock().await;
        data.texts.push(text.to_string());
        data.embeddings.push(embedding);

        if let Err(e) = self.persist(&data) {
            data.texts.pop();
            data.embeddings.pop();
            return Err(e);
        }

        debug!(records = data.texts.len(), "Memory added");
        Ok(text.to_string())
    }

    async fn get_relevant(&self, query: &str, k: usize) -> Result<Vec<String>, MemoryError> {
        if k == 0 || self.data.lock().await.texts.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embed_checked(query).await?;

        let data = self.data.lock().await;
        Ok(top_k(&data.embeddings, &query_embedding, k)
            .into_iter()
            .map(|i| data.texts[i].clone())
            .collect())
    }

    async fn clear(&self) -> Result<String, MemoryError> {
        let mut data = self.data.lock().await;
        *data = CacheContent::default();
        self.persist(&data)?;
        Ok("Memory cleared".into())
    }

    async fn stats(&self) -> MemoryStats {
        let data = self.data.lock().await;
        MemoryStats {
            records: data.texts.len(),
            shape: (data.embeddings.len(), self.dimensions),
        }
    }
}
