//! # AutoLite Core
//!
//! Domain types, traits, and error definitions for the AutoLite agent.
//! Every other crate in the workspace builds on the domain model defined here.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates:
//! - `CompletionClient` / `Embedder` in `autolite-providers`
//! - `MemoryBackend` in `autolite-memory`
//! - `CommandHandler` in `autolite-tools` and `autolite-agent`

pub mod command;
pub mod error;
pub mod memory;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use command::{Command, CommandHandler, CommandKind, CommandOutcome, CommandRegistry};
pub use error::{Error, MemoryError, ProviderError, Result, ToolError};
pub use memory::{MemoryBackend, MemoryStats};
pub use message::{Message, Role};
pub use provider::{CompletionClient, CompletionRequest, Embedder};
