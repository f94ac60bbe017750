//! Backend construction from configuration.

use std::sync::Arc;
use std::time::Duration;

use autolite_config::AppConfig;
use autolite_core::error::ProviderError;
use autolite_core::provider::{CompletionClient, Embedder};
use autolite_memory::HashEmbedder;
use tracing::info;

use crate::llama_cli::LlamaCliProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// The model-facing services the agent runs on.
#[derive(Clone)]
pub struct Backends {
    /// Main loop and JSON repair
    pub completion: Arc<dyn CompletionClient>,
    /// Sub-agents and code helpers
    pub fast: Arc<dyn CompletionClient>,
    /// Memory embeddings
    pub embedder: Arc<dyn Embedder>,
}

/// Build the configured completion clients and embedder.
pub fn build_from_config(config: &AppConfig) -> Result<Backends, ProviderError> {
    let llm = &config.llm;
    let timeout = Duration::from_secs(llm.timeout_secs);
    let api_key = llm.api_key.clone().unwrap_or_else(|| "no-key".into());

    let (completion, fast): (Arc<dyn CompletionClient>, Arc<dyn CompletionClient>) = match llm.provider.as_str() {
        "openai_compat" => (
            Arc::new(OpenAiCompatProvider::with_timeout(
                "openai_compat",
                &llm.api_url,
                &api_key,
                &llm.model,
                timeout,
            )?),
            Arc::new(OpenAiCompatProvider::with_timeout(
                "openai_compat",
                &llm.api_url,
                &api_key,
                llm.fast_model(),
                timeout,
            )?),
        ),
        "llama_cli" => {
            let model_path = llm
                .model_path
                .as_deref()
                .ok_or_else(|| ProviderError::NotConfigured("llm.model_path is required for llama_cli".into()))?;
            let provider: Arc<dyn CompletionClient> = Arc::new(
                LlamaCliProvider::new(&llm.llama_cli_path, model_path, llm.context_size)?
                    .with_default_max_tokens(llm.max_tokens),
            );
            (provider.clone(), provider)
        }
        other => {
            return Err(ProviderError::NotConfigured(format!(
                "unknown llm.provider '{other}' (expected 'openai_compat' or 'llama_cli')"
            )));
        }
    };

    let embedder: Arc<dyn Embedder> = match config.memory.embedding.as_str() {
        "api" => Arc::new(
            OpenAiCompatProvider::with_timeout("embeddings", &llm.api_url, &api_key, &llm.model, timeout)?
                .with_embedding_dimensions(config.memory.embed_dim),
        ),
        _ => Arc::new(HashEmbedder::new(config.memory.embed_dim)),
    };

    info!(
        provider = %llm.provider,
        model = %completion.default_model(),
        embedding = %config.memory.embedding,
        "Backends ready"
    );

    Ok(Backends {
        completion,
        fast,
        embedder,
    })
}
