//! Configuration loading, validation, and management for AutoLite.
//!
//! Loads configuration from `~/.autolite/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.autolite/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name the agent introduces itself with
    #[serde(default = "default_ai_name")]
    pub ai_name: String,

    /// One-line role description placed at the top of the system prompt
    #[serde(default = "default_ai_role")]
    pub ai_role: String,

    /// Goals, listed in order in the system prompt
    #[serde(default)]
    pub ai_goals: Vec<String>,

    /// Run without asking for human feedback between cycles
    #[serde(default)]
    pub continuous_mode: bool,

    /// Stop continuous mode after this many cycles (0 = unlimited)
    #[serde(default)]
    pub continuous_limit: u32,

    /// Allow `execute_shell` and `execute_python_file`
    #[serde(default = "default_true")]
    pub execute_local_commands: bool,

    /// Directory that confines all file and shell commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<PathBuf>,

    /// Language model backend
    #[serde(default)]
    pub llm: LlmConfig,

    /// Vector memory store
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Context window assembly and retry policy
    #[serde(default)]
    pub context: ContextConfig,

    /// Web access for the browse and search commands
    #[serde(default)]
    pub browsing: BrowsingConfig,
}

fn default_ai_name() -> String {
    "AutoLite".into()
}
fn default_ai_role() -> String {
    "an AI designed to autonomously develop and run small software projects".into()
}
fn default_true() -> bool {
    true
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai_compat" (llama.cpp server, Ollama, vLLM) or "llama_cli"
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model for the main loop and for JSON repair
    #[serde(default = "default_model")]
    pub model: String,

    /// Model for sub-agents and code helpers; falls back to `model`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_model: Option<String>,

    /// Path to the `llama-cli` binary (llama_cli provider)
    #[serde(default = "default_llama_cli_path")]
    pub llama_cli_path: String,

    /// GGUF model file (llama_cli provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    /// Context size the backend was started with
    #[serde(default = "default_context_size")]
    pub context_size: u32,

    /// Token budget for one main-loop completion (prompt + reply)
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,

    /// Reply cap for helper completions (summaries, code helpers, sub-agents)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "openai_compat".into()
}
fn default_api_url() -> String {
    "http://localhost:8080/v1".into()
}
fn default_model() -> String {
    "local-model".into()
}
fn default_llama_cli_path() -> String {
    "llama-cli".into()
}
fn default_context_size() -> u32 {
    8192
}
fn default_token_limit() -> usize {
    8000
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_temperature() -> f32 {
    1.0
}
fn default_llm_timeout() -> u64 {
    300
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("fast_model", &self.fast_model)
            .field("llama_cli_path", &self.llama_cli_path)
            .field("model_path", &self.model_path)
            .field("context_size", &self.context_size)
            .field("token_limit", &self.token_limit)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_url: default_api_url(),
            api_key: None,
            model: default_model(),
            fast_model: None,
            llama_cli_path: default_llama_cli_path(),
            model_path: None,
            context_size: default_context_size(),
            token_limit: default_token_limit(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    pub fn fast_model(&self) -> &str {
        self.fast_model.as_deref().unwrap_or(&self.model)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "local" or "no_memory"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// File stem of the JSON snapshot
    #[serde(default = "default_memory_index")]
    pub memory_index: String,

    /// Directory holding the snapshot; defaults to the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_dir: Option<PathBuf>,

    #[serde(default = "default_embed_dim")]
    pub embed_dim: usize,

    /// "hash" (offline) or "api" (`/embeddings` on the llm endpoint)
    #[serde(default = "default_embedding")]
    pub embedding: String,
}

fn default_memory_backend() -> String {
    "local".into()
}
fn default_memory_index() -> String {
    "autolite".into()
}
fn default_embed_dim() -> usize {
    4096
}
fn default_embedding() -> String {
    "hash".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            memory_index: default_memory_index(),
            memory_dir: None,
            embed_dim: default_embed_dim(),
            embedding: default_embedding(),
        }
    }
}

impl MemoryConfig {
    /// Full path of the JSON snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        let dir = self.memory_dir.clone().unwrap_or_else(AppConfig::config_dir);
        dir.join(format!("{}.json", self.memory_index))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Memory snippets retrieved per completion
    #[serde(default = "default_relevant_k")]
    pub relevant_k: usize,

    /// Trailing history messages used as the relevance query
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Token ceiling for the three preamble messages
    #[serde(default = "default_preamble_ceiling")]
    pub preamble_ceiling: usize,

    /// Tokens held back from the budget for the reply
    #[serde(default = "default_reply_reserve")]
    pub reply_reserve: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
}

fn default_relevant_k() -> usize {
    10
}
fn default_history_window() -> usize {
    9
}
fn default_preamble_ceiling() -> usize {
    2500
}
fn default_reply_reserve() -> usize {
    1000
}
fn default_max_attempts() -> u32 {
    5
}
fn default_retry_backoff() -> u64 {
    10
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            relevant_k: default_relevant_k(),
            history_window: default_history_window(),
            preamble_ceiling: default_preamble_ceiling(),
            reply_reserve: default_reply_reserve(),
            max_attempts: default_max_attempts(),
            retry_backoff_secs: default_retry_backoff(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowsingConfig {
    /// Characters of page text per summarisation chunk
    #[serde(default = "default_chunk_max_length")]
    pub chunk_max_length: usize,

    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_browse_timeout")]
    pub timeout_secs: u64,
}

fn default_chunk_max_length() -> usize {
    8192
}
fn default_summary_max_tokens() -> u32 {
    300
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".into()
}
fn default_browse_timeout() -> u64 {
    30
}

impl Default for BrowsingConfig {
    fn default() -> Self {
        Self {
            chunk_max_length: default_chunk_max_length(),
            summary_max_tokens: default_summary_max_tokens(),
            user_agent: default_user_agent(),
            timeout_secs: default_browse_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.autolite/config.toml).
    ///
    /// Environment variables override the file:
    /// - `AUTOLITE_API_KEY`
    /// - `AUTOLITE_API_URL`
    /// - `AUTOLITE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_path())
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if config.llm.api_key.is_none() {
            config.llm.api_key = std::env::var("AUTOLITE_API_KEY").ok();
        }
        if let Ok(url) = std::env::var("AUTOLITE_API_URL") {
            config.llm.api_url = url;
        }
        if let Ok(model) = std::env::var("AUTOLITE_MODEL") {
            config.llm.model = model;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".autolite")
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// The workspace that confines file and shell commands.
    pub fn workspace(&self) -> PathBuf {
        self.workspace_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("workspace"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.llm.token_limit <= self.context.reply_reserve {
            return Err(ConfigError::ValidationError(format!(
                "llm.token_limit ({}) must exceed context.reply_reserve ({})",
                self.llm.token_limit, self.context.reply_reserve
            )));
        }

        if self.memory.embed_dim == 0 {
            return Err(ConfigError::ValidationError("memory.embed_dim must be > 0".into()));
        }

        if self.memory.memory_index.trim().is_empty() {
            return Err(ConfigError::ValidationError("memory.memory_index must not be empty".into()));
        }

        if !matches!(self.memory.backend.as_str(), "local" | "no_memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown memory.backend '{}' (expected 'local' or 'no_memory')",
                self.memory.backend
            )));
        }

        if self.context.max_attempts == 0 {
            return Err(ConfigError::ValidationError("context.max_attempts must be >= 1".into()));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ai_name: default_ai_name(),
            ai_role: default_ai_role(),
            ai_goals: Vec::new(),
            continuous_mode: false,
            continuous_limit: 0,
            execute_local_commands: true,
            workspace_dir: None,
            llm: LlmConfig::default(),
            memory: MemoryConfig::default(),
            context: ContextConfig::default(),
            browsing: BrowsingConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
