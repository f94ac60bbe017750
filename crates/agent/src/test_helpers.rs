//! Shared test doubles for the agent tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use autolite_core::error::{MemoryError, ProviderError};
use autolite_core::memory::{MemoryBackend, MemoryStats};
use autolite_core::provider::{CompletionClient, CompletionRequest};

/// A completion client that plays back a script of replies or failures.
///
/// Once the script is exhausted every call fails.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn replies(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn new(script: Vec<Result<String, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "gpt-3.5-turbo"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidResponse("script exhausted".into())))
    }
}

/// Memory that returns fixed snippets and records every call.
#[derive(Default)]
pub struct RecordingMemory {
    pub snippets: Vec<String>,
    pub added: Mutex<Vec<String>>,
    pub queries: Mutex<Vec<(String, usize)>>,
}

impl RecordingMemory {
    pub fn with_snippets(snippets: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            snippets: snippets.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn added(&self) -> Vec<String> {
        self.added.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemoryBackend for RecordingMemory {
    fn name(&self) -> &str {
        "recording"
    }

    async fn add(&self, text: &str) -> Result<String, MemoryError> {
        self.added.lock().unwrap().push(text.to_string());
        Ok(text.to_string())
    }

    async fn get_relevant(&self, query: &str, k: usize) -> Result<Vec<String>, MemoryError> {
        self.queries.lock().unwrap().push((query.to_string(), k));
        Ok(self.snippets.iter().take(k).cloned().collect())
    }

    async fn clear(&self) -> Result<String, MemoryError> {
        self.added.lock().unwrap().clear();
        Ok("Memory cleared".into())
    }

    async fn stats(&self) -> MemoryStats {
        MemoryStats {
            records: self.added.lock().unwrap().len(),
            shape: (0, 0),
        }
    }
}

/// Memory whose lookups always fail.
pub struct BrokenMemory;

#[async_trait]
impl MemoryBackend for BrokenMemory {
    fn name(&self) -> &str {
        "broken"
    }

    async fn add(&self, _text: &str) -> Result<String, MemoryError> {
        Err(MemoryError::Storage("disk full".into()))
    }

    async fn get_relevant(&self, _query: &str, _k: usize) -> Result<Vec<String>, MemoryError> {
        Err(MemoryError::EmbeddingFailed("embedder offline".into()))
    }

    async fn clear(&self) -> Result<String, MemoryError> {
        Err(MemoryError::Storage("disk full".into()))
    }

    async fn stats(&self) -> MemoryStats {
        MemoryStats::default()
    }
}

/// A reply in the agent's JSON response format.
pub fn command_reply(name: &str, args: &[(&str, &str)]) -> String {
    let args: serde_json::Map<String, serde_json::Value> = args
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect();
    serde_json::json!({
        "thoughts": {
            "text": "thinking",
            "reasoning": "because",
            "plan": "- do it",
            "criticism": "none",
            "speak": "on it"
        },
        "command": { "name": name, "args": args }
    })
    .to_string()
}

/// Memory that can be searched but refuses every write.
pub struct FullMemory;

#[async_trait]
impl MemoryBackend for FullMemory {
    fn name(&self) -> &str {
        "full"
    }

    async fn add(&self, _text: &str) -> Result<String, MemoryError> {
        Err(MemoryError::Storage("disk full".into()))
    }

    async fn get_relevant(&self, _query: &str, _k: usize) -> Result<Vec<String>, MemoryError> {
        Ok(Vec::new())
    }

    async fn clear(&self) -> Result<String, MemoryError> {
        Ok("Memory cleared".into())
    }

    async fn stats(&self) -> MemoryStats {
        MemoryStats::default()
    }
}
