//! Built-in command handlers for AutoLite.
//!
//! Commands give the agent the ability to interact with the world:
//! read and write workspace files, run shell and Python, search and read
//! the web, store notes in memory, and ask the model for code reviews.
//!
//! The sub-agent commands (`start_agent` and friends) live in
//! `autolite-agent` next to the registry they manage.

pub mod code;
pub mod control;
pub mod files;
pub mod html;
pub mod memory_add;
pub mod shell;
pub mod web;

use std::path::PathBuf;
use std::sync::Arc;

use autolite_core::command::CommandRegistry;
use autolite_core::error::ToolError;
use autolite_core::memory::MemoryBackend;
use autolite_core::provider::CompletionClient;
use tracing::debug;

pub use code::{AiFunction, EvaluateCode, ImproveCode, WriteTests};
pub use control::{DoNothing, TaskComplete};
pub use files::{AppendToFile, DeleteFile, ReadFile, SearchFiles, WriteToFile};
pub use memory_add::MemoryAdd;
pub use shell::{ExecPolicy, ExecutePythonFile, ExecuteShell};
pub use web::{BrowseWebsite, GetHyperlinks, GetTextSummary, WebClient, WebSearch, WebSettings};

/// Everything the built-in handlers need.
pub struct ToolContext {
    pub workspace: PathBuf,
    pub exec: ExecPolicy,
    pub web: WebSettings,
    pub memory: Arc<dyn MemoryBackend>,
    /// Used for page summaries
    pub completion: Arc<dyn CompletionClient>,
    /// Used for the code helpers
    pub fast: Arc<dyn CompletionClient>,
}

/// Register every built-in command except the sub-agent ones.
///
/// Security defaults:
/// - File commands are confined to `workspace`
/// - Shell and Python only run when `exec.enabled` is set
/// - Web commands refuse local and non-http URLs
pub fn register_builtin(registry: &mut CommandRegistry, ctx: ToolContext) -> Result<(), ToolError> {
    let web = Arc::new(WebClient::new(ctx.web, ctx.completion, ctx.memory.clone())?);
    let ai = Arc::new(AiFunction::new(ctx.fast));

    registry.register(Box::new(WebSearch::new(web.clone())));
    registry.register(Box::new(BrowseWebsite::new(web.clone())));
    registry.register(Box::new(GetTextSummary::new(web.clone())));
    registry.register(Box::new(GetHyperlinks::new(web)));
    registry.register(Box::new(MemoryAdd::new(ctx.memory)));

    registry.register(Box::new(ReadFile::new(&ctx.workspace)));
    registry.register(Box::new(WriteToFile::new(&ctx.workspace)));
    registry.register(Box::new(AppendToFile::new(&ctx.workspace)));
    registry.register(Box::new(DeleteFile::new(&ctx.workspace)));
    registry.register(Box::new(SearchFiles::new(&ctx.workspace)));

    registry.register(Box::new(ExecutePythonFile::new(ctx.exec.clone())));
    registry.register(Box::new(ExecuteShell::new(ctx.exec)));

    registry.register(Box::new(EvaluateCode::new(ai.clone())));
    registry.register(Box::new(ImproveCode::new(ai.clone())));
    registry.register(Box::new(WriteTests::new(ai)));

    registry.register(Box::new(DoNothing));
    registry.register(Box::new(TaskComplete));

    debug!(commands = registry.len(), "Built-in commands registered");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use autolite_core::command::{Command, CommandKind, CommandOutcome};
    use autolite_memory::NoMemory;

    fn context(dir: &std::path::Path) -> ToolContext {
        let client = test_support::ScriptedClient::new(&[]);
        ToolContext {
            workspace: dir.to_path_buf(),
            exec: ExecPolicy::new(dir).with_enabled(false),
            web: WebSettings::default(),
            memory: Arc::new(NoMemory),
            completion: client.clone(),
            fast: client,
        }
    }

    #[test]
    fn registers_all_but_agent_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = CommandRegistry::new();
        register_builtin(&mut registry, context(dir.path())).unwrap();

        assert_eq!(registry.len(), 17);
        assert!(registry.get(CommandKind::StartAgent).is_none());
        assert!(registry.get(CommandKind::TaskComplete).is_some());
    }

    #[tokio::test]
    async fn file_round_trip_through_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = CommandRegistry::new();
        register_builtin(&mut registry, context(dir.path())).unwrap();

        let write = Command::new("write_to_file")
            .with_arg("file", "notes/plan.txt")
            .with_arg("text", "step one");
        assert_eq!(registry.dispatch(&write).await, CommandOutcome::output("File written."));

        let read = Command::new("read_file").with_arg("file", "notes/plan.txt");
        assert_eq!(registry.dispatch(&read).await, CommandOutcome::output("step one"));
    }

    #[tokio::test]
    async fn disabled_shell_reports_error_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = CommandRegistry::new();
        register_builtin(&mut registry, context(dir.path())).unwrap();

        let out = registry
            .dispatch(&Command::new("execute_shell").with_arg("command_line", "echo hi"))
            .await;
        assert!(matches!(out, CommandOutcome::Output(ref s) if s.starts_with("Error:")));
    }
}
