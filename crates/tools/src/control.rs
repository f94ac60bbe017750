//! Loop-control commands.

use async_trait::async_trait;
use autolite_core::command::{Command, CommandHandler, CommandKind, CommandOutcome};
use autolite_core::error::ToolError;

pub struct DoNothing;

#[async_trait]
impl CommandHandler for DoNothing {
    fn kind(&self) -> CommandKind {
        CommandKind::DoNothing
    }

    fn label(&self) -> &str {
        "Do Nothing"
    }

    async fn execute(&self, _command: &Command) -> Result<CommandOutcome, ToolError> {
        Ok(CommandOutcome::output("No action performed."))
    }
}

/// Ends the run. The loop sees [`CommandOutcome::Shutdown`] and stops.
pub struct TaskComplete;

#[async_trait]
impl CommandHandler for TaskComplete {
    fn kind(&self) -> CommandKind {
        CommandKind::TaskComplete
    }

    fn label(&self) -> &str {
        "Task Complete (Shutdown)"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["reason"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        let reason = command.arg_opt("reason").unwrap_or("task complete").to_string();
        Ok(CommandOutcome::Shutdown { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn do_nothing_reports_no_action() {
        let out = DoNothing.execute(&Command::new("do_nothing")).await.unwrap();
        assert_eq!(out, CommandOutcome::output("No action performed."));
    }

    #[tokio::test]
    async fn task_complete_shuts_down_with_reason() {
        let out = TaskComplete
            .execute(&Command::new("task_complete").with_arg("reason", "all goals met"))
            .await
            .unwrap();
        assert_eq!(out, CommandOutcome::Shutdown { reason: "all goals met".into() });
    }
}
