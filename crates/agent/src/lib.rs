//! The autonomous agent loop: the heart of AutoLite.
//!
//! Each cycle follows a **Think → Act → Record** pattern:
//!
//! 1. **Build context** (system prompt + recalled memories + history window)
//! 2. **Send to the LLM** and receive a JSON reply
//! 3. **Parse** the reply into a command, repairing malformed JSON
//! 4. **Dispatch** the command and record its output in history and memory
//! 5. **Feedback**: ask the human (or continue automatically)
//!
//! The loop ends when the agent issues `task_complete`, the continuous
//! limit is reached, or the human types `exit`.

pub mod context;
pub mod parser;
pub mod prompt;
pub mod registry;
pub mod runner;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{AssemblyConfig, AssemblyMetadata, ChatOutcome, ContextAssembler, RetryPolicy, TokenCounter};
pub use parser::{CommandParseError, CommandParser, JSON_SCHEMA, ParsedReply, Thoughts};
pub use prompt::PromptBuilder;
pub use registry::{AgentRegistry, DeleteAgent, ListAgents, MessageAgent, StartAgent, register_agent_commands};
pub use runner::{AgentLoop, DEFAULT_INSTRUCTION, FeedbackSource, LoopSettings, RunSummary, ScriptedFeedback, StopReason};
