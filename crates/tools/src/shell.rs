//! Local execution commands: `execute_shell` and `execute_python_file`.
//!
//! Both run with the workspace as the working directory and are refused
//! outright when local commands are disabled.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use autolite_core::command::{Command, CommandHandler, CommandKind, CommandOutcome};
use autolite_core::error::ToolError;
use autolite_security::resolve_in_workspace;
use tokio::process::Command as Process;
use tracing::{debug, warn};

/// Settings shared by the execution commands.
#[derive(Debug, Clone)]
pub struct ExecPolicy {
    pub workspace: PathBuf,
    pub enabled: bool,
    pub timeout: Duration,
    pub python: String,
}

impl ExecPolicy {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            enabled: true,
            timeout: Duration::from_secs(300),
            python: "python3".into(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn check_enabled(&self, kind: CommandKind) -> Result<(), ToolError> {
        if self.enabled {
            Ok(())
        } else {
            Err(ToolError::PermissionDenied {
                tool_name: kind.name().into(),
                reason: "local command execution is disabled".into(),
            })
        }
    }

    async fn run(&self, kind: CommandKind, mut process: Process) -> Result<std::process::Output, ToolError> {
        tokio::fs::create_dir_all(&self.workspace)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: kind.name().into(),
                reason: format!("cannot create workspace: {e}"),
            })?;

        process.current_dir(&self.workspace).kill_on_drop(true);

        match tokio::time::timeout(self.timeout, process.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ToolError::ExecutionFailed {
                tool_name: kind.name().into(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ToolError::Timeout {
                tool_name: kind.name().into(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}

pub struct ExecuteShell {
    policy: ExecPolicy,
}

impl ExecuteShell {
    pub fn new(policy: ExecPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl CommandHandler for ExecuteShell {
    fn kind(&self) -> CommandKind {
        CommandKind::ExecuteShell
    }

    fn label(&self) -> &str {
        "Execute Shell Command, non-interactive commands only"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["command_line"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        self.policy.check_enabled(self.kind())?;
        let line = command.arg("command_line")?;

        debug!(command = %line, "Executing shell command");

        let mut process = if cfg!(target_os = "windows") {
            Process::new("cmd")
        } else {
            Process::new("sh")
        };
        if cfg!(target_os = "windows") {
            process.args(["/C", line]);
        } else {
            process.args(["-c", line]);
        }

        let output = self.policy.run(self.kind(), process).await?;
        if !output.status.success() {
            warn!(command = %line, exit_code = ?output.status.code(), "Shell command failed");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(CommandOutcome::Output(format!("STDOUT:\n{stdout}\nSTDERR:\n{stderr}")))
    }
}

pub struct ExecutePythonFile {
    policy: ExecPolicy,
}

impl ExecutePythonFile {
    pub fn new(policy: ExecPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl CommandHandler for ExecutePythonFile {
    fn kind(&self) -> CommandKind {
        CommandKind::ExecutePythonFile
    }

    fn label(&self) -> &str {
        "Execute Python File"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["file"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        self.policy.check_enabled(self.kind())?;
        let file = command.arg("file")?;

        if !file.ends_with(".py") {
            return Err(ToolError::InvalidArguments(format!("only .py files can be executed, got '{file}'")));
        }

        let path = resolve_in_workspace(&self.policy.workspace, file).map_err(|e| ToolError::PermissionDenied {
            tool_name: self.kind().name().into(),
            reason: e.to_string(),
        })?;

        if !path.is_file() {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.kind().name().into(),
                reason: format!("file '{file}' not found"),
            });
        }

        let mut process = Process::new(&self.policy.python);
        process.arg(&path);
        let output = self.policy.run(self.kind(), process).await?;

        if output.status.success() {
            Ok(CommandOutcome::Output(String::from_utf8_lossy(&output.stdout).into_owned()))
        } else {
            Err(ToolError::ExecutionFailed {
                tool_name: self.kind().name().into(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
