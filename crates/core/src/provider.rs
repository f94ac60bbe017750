//! Completion and embedding traits: the abstraction over model backends.
//!
//! The agent only ever needs two things from a model: turn a message list
//! into a reply, and turn a text into a fixed-length vector. Both are opaque
//! services; implementations live in `autolite-providers` and
//! `autolite-memory`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, ProviderError};
use crate::message::Message;

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model override; `None` uses the client's configured model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// The conversation messages, in order
    pub messages: Vec<Message>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature (0.0 = deterministic)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    1.0
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: None,
            messages,
            max_tokens: None,
            temperature: default_temperature(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A backend that turns a message list into reply text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// A human-readable name for this backend (e.g., "llama-server").
    fn name(&self) -> &str;

    /// The model used when a request does not name one.
    fn default_model(&self) -> &str;

    /// Send a request and get the reply text.
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<String, ProviderError>;
}

/// A backend that maps text to a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder returns.
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_sets_fields() {
        let req = CompletionRequest::new(vec![Message::user("hi")])
            .with_model("mistral-7b")
            .with_max_tokens(512)
            .with_temperature(0.0);
        assert_eq!(req.model.as_deref(), Some("mistral-7b"));
        assert_eq!(req.max_tokens, Some(512));
        assert_eq!(req.temperature, 0.0);
    }

    #[test]
    fn request_defaults_temperature_when_missing() {
        let req: CompletionRequest =
            serde_json::from_str(r#"{"messages":[{"role":"user","content":"x"}]}"#).unwrap();
        assert!((req.temperature - 1.0).abs() < f32::EPSILON);
        assert!(req.model.is_none());
    }
}
