//! `memory_add`: store a note in long-term memory.

use std::sync::Arc;

use async_trait::async_trait;
use autolite_core::command::{Command, CommandHandler, CommandKind, CommandOutcome};
use autolite_core::error::ToolError;
use autolite_core::memory::MemoryBackend;

pub struct MemoryAdd {
    memory: Arc<dyn MemoryBackend>,
}

impl MemoryAdd {
    pub fn new(memory: Arc<dyn MemoryBackend>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl CommandHandler for MemoryAdd {
    fn kind(&self) -> CommandKind {
        CommandKind::MemoryAdd
    }

    fn label(&self) -> &str {
        "Memory Add"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["string"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        let text = command.arg("string")?;
        let stored = self.memory.add(text).await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.kind().name().into(),
            reason: e.to_string(),
        })?;
        Ok(CommandOutcome::Output(format!("Committing memory with string \"{stored}\"")))
    }
}
