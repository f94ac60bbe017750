//! Subprocess backend: runs the llama.cpp `llama-cli` binary per completion.
//!
//! No server needed. Each request renders the conversation as a
//! `role: content` transcript, passes it with `-p`, and returns stdout. A
//! model directory is accepted in place of a file; the first `.gguf` inside
//! is used.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use autolite_core::error::ProviderError;
use autolite_core::message::transcript;
use autolite_core::provider::{CompletionClient, CompletionRequest};
use tokio::process::Command;
use tracing::{debug, info, warn};

pub struct LlamaCliProvider {
    binary: String,
    model_file: PathBuf,
    model_name: String,
    context_size: u32,
    threads: usize,
    gpu_layers: u32,
    default_max_tokens: u32,
}

impl LlamaCliProvider {
    /// Resolve `model_path` (file or directory) and pick a thread count.
    pub fn new(binary: impl Into<String>, model_path: &Path, context_size: u32) -> Result<Self, ProviderError> {
        let model_file = resolve_model_file(model_path)?;
        let model_name = model_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "llama".into());
        let threads = optimal_threads();

        info!(model = %model_file.display(), threads, "llama-cli backend ready");

        Ok(Self {
            binary: binary.into(),
            model_file,
            model_name,
            context_size,
            threads,
            gpu_layers: 1,
            default_max_tokens: 4000,
        })
    }

    pub fn with_default_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    pub fn with_gpu_layers(mut self, layers: u32) -> Self {
        self.gpu_layers = layers;
        self
    }

    fn args(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Vec<String> {
        vec![
            "-m".into(),
            self.model_file.to_string_lossy().into_owned(),
            "-p".into(),
            prompt.into(),
            "--temp".into(),
            temperature.to_string(),
            "-n".into(),
            max_tokens.to_string(),
            "-t".into(),
            self.threads.to_string(),
            "--ctx_size".into(),
            self.context_size.to_string(),
            "-ngl".into(),
            self.gpu_layers.to_string(),
        ]
    }
}

/// 85% of the available cores, rounded up.
fn optimal_threads() -> usize {
    let total = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    (total * 85).div_ceil(100).max(1)
}

fn resolve_model_file(path: &Path) -> Result<PathBuf, ProviderError> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    let entries = std::fs::read_dir(path)
        .map_err(|e| ProviderError::NotConfigured(format!("Cannot read model path {}: {e}", path.display())))?;

    let mut ggufs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "gguf"))
        .collect();
    ggufs.sort();

    ggufs
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ModelNotFound(format!("No .gguf model in {}", path.display())))
}

/// llama-cli echoes the prompt before the generated text.
fn strip_echo<'a>(stdout: &'a str, prompt: &str) -> &'a str {
    stdout.strip_prefix(prompt).unwrap_or(stdout).trim()
}

#[async_trait]
impl CompletionClient for LlamaCliProvider {
    fn name(&self) -> &str {
        "llama-cli"
    }

    fn default_model(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let prompt = transcript(&request.messages);
        let max_tokens = request.max_tokens.unwrap_or(self.default_max_tokens);

        debug!(binary = %self.binary, max_tokens, prompt_chars = prompt.len(), "Running llama-cli");

        let output = Command::new(&self.binary)
            .args(self.args(&prompt, max_tokens, request.temperature))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to run {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(status = ?output.status.code(), "llama-cli exited with an error");
            return Err(ProviderError::ApiError {
                status_code: output.status.code().unwrap_or(-1).clamp(0, u16::MAX as i32) as u16,
                message: stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(strip_echo(&stdout, &prompt).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autolite_core::message::Message;

    #[test]
    fn directory_resolves_first_gguf() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "").unwrap();
        std::fs::write(dir.path().join("b.gguf"), "").unwrap();
        std::fs::write(dir.path().join("a.gguf"), "").unwrap();

        let provider = LlamaCliProvider::new("llama-cli", dir.path(), 4096).unwrap();
        assert_eq!(provider.default_model(), "a");
    }

    #[test]
    fn directory_without_model_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LlamaCliProvider::new("llama-cli", dir.path(), 4096).err().unwrap();
        assert!(matches!(err, ProviderError::ModelNotFound(_)));
    }

    #[test]
    fn args_carry_sampling_and_context() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("m.gguf");
        std::fs::write(&file, "").unwrap();
        let provider = LlamaCliProvider::new("llama-cli", &file, 8192).unwrap();

        let args = provider.args("user: hi", 256, 0.5);
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-p") + 1], "user: hi");
        assert_eq!(args[pos("-n") + 1], "256");
        assert_eq!(args[pos("--temp") + 1], "0.5");
        assert_eq!(args[pos("--ctx_size") + 1], "8192");
    }

    #[test]
    fn echo_is_stripped() {
        assert_eq!(strip_echo("user: hi\n{\"a\":1}\n", "user: hi"), "{\"a\":1}");
        assert_eq!(strip_echo("  plain ", "other"), "plain");
    }

    #[test]
    fn thread_count_is_positive() {
        assert!(optimal_threads() >= 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_binary_is_not_configured() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("m.gguf");
        std::fs::write(&file, "").unwrap();
        let provider = LlamaCliProvider::new("/nonexistent/llama-cli", &file, 512).unwrap();

        let err = provider
            .complete(CompletionRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
