//! Completion and embedding backends for AutoLite.
//!
//! Backends implement `autolite_core::CompletionClient` and/or
//! `autolite_core::Embedder`. The router builds the configured pair.

pub mod llama_cli;
pub mod openai_compat;
pub mod router;

pub use llama_cli::LlamaCliProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{Backends, build_from_config};
