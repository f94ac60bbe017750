//! Commands: the agent's capabilities, addressed by name from model replies.
//!
//! The model names a command in its JSON reply; the loop resolves that name
//! to a [`CommandKind`] and dispatches it through the [`CommandRegistry`],
//! a lookup table built once at startup. Every dispatch produces a string
//! for the transcript (or a shutdown signal). Failures never escape as
//! errors.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ToolError;

/// Every command the agent knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    WebSearch,
    BrowseWebsite,
    GetTextSummary,
    GetHyperlinks,
    MemoryAdd,
    StartAgent,
    MessageAgent,
    ListAgents,
    DeleteAgent,
    ReadFile,
    WriteToFile,
    AppendToFile,
    DeleteFile,
    SearchFiles,
    ExecutePythonFile,
    ExecuteShell,
    EvaluateCode,
    ImproveCode,
    WriteTests,
    DoNothing,
    TaskComplete,
}

impl CommandKind {
    /// All kinds, in the order they are listed in the prompt.
    pub const ALL: [CommandKind; 21] = [
        CommandKind::WebSearch,
        CommandKind::BrowseWebsite,
        CommandKind::GetTextSummary,
        CommandKind::GetHyperlinks,
        CommandKind::MemoryAdd,
        CommandKind::StartAgent,
        CommandKind::MessageAgent,
        CommandKind::ListAgents,
        CommandKind::DeleteAgent,
        CommandKind::ReadFile,
        CommandKind::WriteToFile,
        CommandKind::AppendToFile,
        CommandKind::DeleteFile,
        CommandKind::SearchFiles,
        CommandKind::ExecutePythonFile,
        CommandKind::ExecuteShell,
        CommandKind::EvaluateCode,
        CommandKind::ImproveCode,
        CommandKind::WriteTests,
        CommandKind::DoNothing,
        CommandKind::TaskComplete,
    ];

    /// The wire name the model uses.
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::WebSearch => "web_search",
            CommandKind::BrowseWebsite => "browse_website",
            CommandKind::GetTextSummary => "get_text_summary",
            CommandKind::GetHyperlinks => "get_hyperlinks",
            CommandKind::MemoryAdd => "memory_add",
            CommandKind::StartAgent => "start_agent",
            CommandKind::MessageAgent => "message_agent",
            CommandKind::ListAgents => "list_agents",
            CommandKind::DeleteAgent => "delete_agent",
            CommandKind::ReadFile => "read_file",
            CommandKind::WriteToFile => "write_to_file",
            CommandKind::AppendToFile => "append_to_file",
            CommandKind::DeleteFile => "delete_file",
            CommandKind::SearchFiles => "search_files",
            CommandKind::ExecutePythonFile => "execute_python_file",
            CommandKind::ExecuteShell => "execute_shell",
            CommandKind::EvaluateCode => "evaluate_code",
            CommandKind::ImproveCode => "improve_code",
            CommandKind::WriteTests => "write_tests",
            CommandKind::DoNothing => "do_nothing",
            CommandKind::TaskComplete => "task_complete",
        }
    }

    /// Resolve a wire name. Matching is case-insensitive and ignores
    /// surrounding whitespace.
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.name() == wanted)
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed command directive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: BTreeMap::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// A required argument.
    pub fn arg(&self, key: &str) -> std::result::Result<&str, ToolError> {
        self.args
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ToolError::InvalidArguments(format!("'{}' requires argument '{key}'", self.name)))
    }

    /// An optional argument; empty strings count as absent.
    pub fn arg_opt(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// What a dispatched command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Text for the transcript
    Output(String),
    /// The agent declared its task finished
    Shutdown { reason: String },
}

impl CommandOutcome {
    pub fn output(text: impl Into<String>) -> Self {
        CommandOutcome::Output(text.into())
    }
}

/// One capability the agent can invoke.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn kind(&self) -> CommandKind;

    /// Short description shown to the model.
    fn label(&self) -> &str;

    /// Argument names, in the order shown to the model.
    fn arg_names(&self) -> &[&'static str] {
        &[]
    }

    async fn execute(&self, command: &Command) -> std::result::Result<CommandOutcome, ToolError>;
}

/// Lookup table from [`CommandKind`] to its handler.
pub struct CommandRegistry {
    handlers: HashMap<CommandKind, Box<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler. Replaces any existing handler for the same kind.
    pub fn register(&mut self, handler: Box<dyn CommandHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: CommandKind) -> Option<&dyn CommandHandler> {
        self.handlers.get(&kind).map(|h| h.as_ref())
    }

    /// Registered kinds in prompt order.
    pub fn kinds(&self) -> Vec<CommandKind> {
        CommandKind::ALL
            .into_iter()
            .filter(|k| self.handlers.contains_key(k))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Numbered command list for the system prompt.
    pub fn describe(&self) -> String {
        self.kinds()
            .into_iter()
            .filter_map(|k| self.handlers.get(&k))
            .enumerate()
            .map(|(i, h)| {
                let args = h
                    .arg_names()
                    .iter()
                    .map(|a| format!("\"{a}\": \"<{a}>\""))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}. {}: \"{}\", args: {}", i + 1, h.label(), h.kind().name(), args)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Run a command and turn every result into transcript text.
    pub async fn dispatch(&self, command: &Command) -> CommandOutcome {
        let Some(kind) = CommandKind::from_name(&command.name) else {
            warn!(command = %command.name, "Unknown command");
            return CommandOutcome::Output(format!("Unknown command '{}'.", command.name));
        };

        let Some(handler) = self.handlers.get(&kind) else {
            warn!(command = %kind, "Command has no registered handler");
            return CommandOutcome::Output(format!("Command '{kind}' is not available."));
        };

        debug!(command = %kind, args = command.args.len(), "Dispatching command");

        match AssertUnwindSafe(handler.execute(command)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(command = %kind, error = %e, "Command failed");
                CommandOutcome::Output(format!("Error: {e}"))
            }
            Err(_) => {
                warn!(command = %kind, "Command panicked");
                CommandOutcome::Output(format!("Error: command '{kind}' panicked"))
            }
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
