//! Code helper commands backed by the model.
//!
//! Each one asks the model to act as a single function: the system message
//! shows the function signature and docstring, the user message carries the
//! arguments, and the reply is the "return value". Temperature is zero.

use std::sync::Arc;

use async_trait::async_trait;
use autolite_core::command::{Command, CommandHandler, CommandKind, CommandOutcome};
use autolite_core::error::ToolError;
use autolite_core::message::Message;
use autolite_core::provider::{CompletionClient, CompletionRequest};
use tracing::debug;

/// Runs "pretend to be this function" prompts against a completion client.
pub struct AiFunction {
    client: Arc<dyn CompletionClient>,
    max_tokens: Option<u32>,
}

impl AiFunction {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client, max_tokens: None }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Ask the model for the return value of `function` called with `args`.
    pub async fn call(&self, function: &str, args: &[&str], description: &str) -> Result<String, ToolError> {
        let messages = vec![
            Message::system(format!(
                "You are now the following function:\n```\n# {description}\n{function}\n```\nOnly respond with your `return` value."
            )),
            Message::user(args.join(", ")),
        ];
        let mut request = CompletionRequest::new(messages).with_temperature(0.0);
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        debug!(function, args = args.len(), "Calling AI function");
        self.client
            .complete(request)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "ai_function".into(),
                reason: e.to_string(),
            })
    }
}

/// Render a list of strings as a Python list literal, the form the
/// function signatures below expect.
fn py_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("'{}'", s.replace('\'', "\\'"))).collect();
    format!("[{}]", quoted.join(", "))
}

/// Split a free-text suggestions argument into items, one per line or `;`.
fn split_items(raw: &str) -> Vec<String> {
    raw.split(['\n', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub struct EvaluateCode {
    ai: Arc<AiFunction>,
}

impl EvaluateCode {
    pub fn new(ai: Arc<AiFunction>) -> Self {
        Self { ai }
    }
}

#[async_trait]
impl CommandHandler for EvaluateCode {
    fn kind(&self) -> CommandKind {
        CommandKind::EvaluateCode
    }

    fn label(&self) -> &str {
        "Evaluate Code"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["code"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        let code = command.arg("code")?;
        let reply = self
            .ai
            .call(
                "def analyze_code(code: str) -> list[str]:",
                &[code],
                "Analyzes the given code and returns a list of suggestions for improvements.",
            )
            .await?;
        Ok(CommandOutcome::Output(reply))
    }
}

pub struct ImproveCode {
    ai: Arc<AiFunction>,
}

impl ImproveCode {
    pub fn new(ai: Arc<AiFunction>) -> Self {
        Self { ai }
    }
}

#[async_trait]
impl CommandHandler for ImproveCode {
    fn kind(&self) -> CommandKind {
        CommandKind::ImproveCode
    }

    fn label(&self) -> &str {
        "Get Improved Code"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["suggestions", "code"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        let suggestions = py_list(&split_items(command.arg("suggestions")?));
        let code = command.arg("code")?;
        let reply = self
            .ai
            .call(
                "def generate_improved_code(suggestions: list[str], code: str) -> str:",
                &[&suggestions, code],
                "Improves the provided code based on the suggestions provided, making no other changes.",
            )
            .await?;
        Ok(CommandOutcome::Output(reply))
    }
}

pub struct WriteTests {
    ai: Arc<AiFunction>,
}

impl WriteTests {
    pub fn new(ai: Arc<AiFunction>) -> Self {
        Self { ai }
    }
}

#[async_trait]
impl CommandHandler for WriteTests {
    fn kind(&self) -> CommandKind {
        CommandKind::WriteTests
    }

    fn label(&self) -> &str {
        "Write Tests"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["code", "focus"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        let code = command.arg("code")?;
        let focus = py_list(&command.arg_opt("focus").map(split_items).unwrap_or_default());
        let reply = self
            .ai
            .call(
                "def create_test_cases(code: str, focus: Optional[str] = None) -> str:",
                &[code, &focus],
                "Generates test cases for the existing code, focusing on specific areas if required.",
            )
            .await?;
        Ok(CommandOutcome::Output(reply))
    }
}
