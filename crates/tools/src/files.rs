//! File commands: read, write, append, delete and list files in the
//! workspace.
//!
//! Every path is resolved through `autolite_security::resolve_in_workspace`
//! before any I/O; an escaping path is a `PermissionDenied` error.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use autolite_core::command::{Command, CommandHandler, CommandKind, CommandOutcome};
use autolite_core::error::ToolError;
use autolite_security::{relative_to_workspace, resolve_in_workspace};
use tracing::debug;

fn resolve(workspace: &Path, kind: CommandKind, raw: &str) -> Result<PathBuf, ToolError> {
    resolve_in_workspace(workspace, raw).map_err(|e| ToolError::PermissionDenied {
        tool_name: kind.name().into(),
        reason: e.to_string(),
    })
}

fn io_failed(kind: CommandKind, path: &str, e: std::io::Error) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: kind.name().into(),
        reason: format!("{path}: {e}"),
    }
}

pub struct ReadFile {
    workspace: PathBuf,
}

impl ReadFile {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self { workspace: workspace.into() }
    }
}

#[async_trait]
impl CommandHandler for ReadFile {
    fn kind(&self) -> CommandKind {
        CommandKind::ReadFile
    }

    fn label(&self) -> &str {
        "Read file"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["file"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        let file = command.arg("file")?;
        let path = resolve(&self.workspace, self.kind(), file)?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io_failed(self.kind(), file, e))?;
        Ok(CommandOutcome::Output(content))
    }
}

pub struct WriteToFile {
    workspace: PathBuf,
}

impl WriteToFile {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self { workspace: workspace.into() }
    }
}

#[async_trait]
impl CommandHandler for WriteToFile {
    fn kind(&self) -> CommandKind {
        CommandKind::WriteToFile
    }

    fn label(&self) -> &str {
        "Write to file"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["file", "text"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        let file = command.arg("file")?;
        let text = command.arg("text")?;
        let path = resolve(&self.workspace, self.kind(), file)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_failed(self.kind(), file, e))?;
        }
        tokio::fs::write(&path, text)
            .await
            .map_err(|e| io_failed(self.kind(), file, e))?;

        debug!(path = %path.display(), bytes = text.len(), "File written");
        Ok(CommandOutcome::output("File written."))
    }
}

pub struct AppendToFile {
    workspace: PathBuf,
}

impl AppendToFile {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self { workspace: workspace.into() }
    }
}

#[async_trait]
impl CommandHandler for AppendToFile {
    fn kind(&self) -> CommandKind {
        CommandKind::AppendToFile
    }

    fn label(&self) -> &str {
        "Append to file"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["file", "text"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        use tokio::io::AsyncWriteExt;

        let file = command.arg("file")?;
        let text = command.arg("text")?;
        let path = resolve(&self.workspace, self.kind(), file)?;

        let mut handle = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_failed(self.kind(), file, e))?;
        handle
            .write_all(text.as_bytes())
            .await
            .map_err(|e| io_failed(self.kind(), file, e))?;
        handle.flush().await.map_err(|e| io_failed(self.kind(), file, e))?;

        Ok(CommandOutcome::output("Text appended."))
    }
}

pub struct DeleteFile {
    workspace: PathBuf,
}

impl DeleteFile {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self { workspace: workspace.into() }
    }
}

#[async_trait]
impl CommandHandler for DeleteFile {
    fn kind(&self) -> CommandKind {
        CommandKind::DeleteFile
    }

    fn label(&self) -> &str {
        "Delete file"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["file"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        let file = command.arg("file")?;
        let path = resolve(&self.workspace, self.kind(), file)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| io_failed(self.kind(), file, e))?;
        Ok(CommandOutcome::output("File deleted."))
    }
}

/// Recursive listing; hidden files are skipped, paths are shown relative to
/// the workspace.
pub struct SearchFiles {
    workspace: PathBuf,
}

impl SearchFiles {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self { workspace: workspace.into() }
    }
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&path, out)?;
        } else if !entry.file_name().to_string_lossy().starts_with('.') {
            out.push(path);
        }
    }
    Ok(())
}

#[async_trait]
impl CommandHandler for SearchFiles {
    fn kind(&self) -> CommandKind {
        CommandKind::SearchFiles
    }

    fn label(&self) -> &str {
        "Search files"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["directory"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        let directory = command.arg_opt("directory").unwrap_or(".");
        let root = resolve(&self.workspace, self.kind(), directory)?;
        let workspace = self.workspace.clone();
        let kind = self.kind();

        let listing = tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            if root.is_dir() {
                walk(&root, &mut found)?;
            }
            found.sort();
            Ok::<_, std::io::Error>(
                found
                    .iter()
                    .map(|p| relative_to_workspace(&workspace, p))
                    .collect::<Vec<_>>(),
            )
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: kind.name().into(),
            reason: e.to_string(),
        })?
        .map_err(|e| io_failed(kind, directory, e))?;

        if listing.is_empty() {
            return Ok(CommandOutcome::output("No files found."));
        }
        Ok(CommandOutcome::Output(listing.join("\n")))
    }
}
