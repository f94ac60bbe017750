//! Sub-agents: short-lived helper conversations the main agent can delegate
//! to. Each one is just a message history and a task label; keys are
//! handed out in increasing order and never reused.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use autolite_core::command::{Command, CommandHandler, CommandKind, CommandOutcome};
use autolite_core::error::ToolError;
use autolite_core::message::Message;
use autolite_core::provider::{CompletionClient, CompletionRequest};
use tokio::sync::Mutex;
use tracing::{debug, info};

struct SubAgent {
    task: String,
    model: Option<String>,
    history: Vec<Message>,
}

#[derive(Default)]
struct Agents {
    next_key: u64,
    live: BTreeMap<u64, SubAgent>,
}

/// Holds every live sub-agent. The lock is never held across a completion.
pub struct AgentRegistry {
    client: Arc<dyn CompletionClient>,
    temperature: f32,
    agents: Mutex<Agents>,
}

impl AgentRegistry {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            temperature: 1.0,
            agents: Mutex::new(Agents::default()),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    async fn complete(&self, model: Option<&str>, history: &[Message]) -> Result<String, ToolError> {
        let mut request = CompletionRequest::new(history.to_vec()).with_temperature(self.temperature);
        if let Some(model) = model {
            request = request.with_model(model);
        }
        self.client
            .complete(request)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "sub_agent".into(),
                reason: e.to_string(),
            })
    }

    /// Start an agent with `prompt` as its first message. Returns the new
    /// key and the agent's first reply.
    pub async fn create(
        &self,
        task: impl Into<String>,
        prompt: &str,
        model: Option<String>,
    ) -> Result<(u64, String), ToolError> {
        let mut history = vec![Message::user(prompt)];
        let reply = self.complete(model.as_deref(), &history).await?;
        history.push(Message::assistant(reply.clone()));

        let task = task.into();
        let mut agents = self.agents.lock().await;
        let key = agents.next_key;
        agents.next_key += 1;
        info!(key, task = %task, "Sub-agent created");
        agents.live.insert(key, SubAgent { task, model, history });
        Ok((key, reply))
    }

    /// Send `message` to agent `key` and return its reply.
    pub async fn message(&self, key: u64, message: &str) -> Result<String, ToolError> {
        let (model, mut history) = {
            let agents = self.agents.lock().await;
            let agent = agents
                .live
                .get(&key)
                .ok_or_else(|| ToolError::InvalidArguments(format!("Agent {key} does not exist.")))?;
            (agent.model.clone(), agent.history.clone())
        };

        history.push(Message::user(message));
        let reply = self.complete(model.as_deref(), &history).await?;

        let mut agents = self.agents.lock().await;
        if let Some(agent) = agents.live.get_mut(&key) {
            agent.history.push(Message::user(message));
            agent.history.push(Message::assistant(reply.clone()));
        } else {
            debug!(key, "Sub-agent deleted while it was answering");
        }
        Ok(reply)
    }

    /// `(key, task)` for every live agent, by key.
    pub async fn list(&self) -> Vec<(u64, String)> {
        let agents = self.agents.lock().await;
        agents.live.iter().map(|(k, a)| (*k, a.task.clone())).collect()
    }

    /// Remove agent `key`. Returns whether it existed.
    pub async fn delete(&self, key: u64) -> bool {
        self.agents.lock().await.live.remove(&key).is_some()
    }
}

fn parse_key(command: &Command) -> Result<u64, ToolError> {
    let raw = command.arg("key")?;
    raw.trim()
        .parse()
        .map_err(|_| ToolError::InvalidArguments(format!("'{raw}' is not a valid agent key")))
}

pub struct StartAgent {
    registry: Arc<AgentRegistry>,
    model: Option<String>,
}

impl StartAgent {
    /// `model` overrides the client's default for every agent started.
    pub fn new(registry: Arc<AgentRegistry>, model: Option<String>) -> Self {
        Self { registry, model }
    }
}

#[async_trait]
impl CommandHandler for StartAgent {
    fn kind(&self) -> CommandKind {
        CommandKind::StartAgent
    }

    fn label(&self) -> &str {
        "Start Agent"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["name", "task", "prompt"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        let name = command.arg("name")?;
        let task = command.arg("task")?;
        let prompt = command.arg("prompt")?;

        let intro = format!("You are {name}. Respond with: \"Acknowledged\".");
        let (key, _) = self.registry.create(task, &intro, self.model.clone()).await?;
        let reply = self.registry.message(key, prompt).await?;

        Ok(CommandOutcome::Output(format!(
            "Agent {name} created with key {key}. First response: {reply}"
        )))
    }
}

pub struct MessageAgent {
    registry: Arc<AgentRegistry>,
}

impl MessageAgent {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl CommandHandler for MessageAgent {
    fn kind(&self) -> CommandKind {
        CommandKind::MessageAgent
    }

    fn label(&self) -> &str {
        "Message Agent"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["key", "message"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        let key = parse_key(command)?;
        let message = command.arg("message")?;
        let reply = self.registry.message(key, message).await?;
        Ok(CommandOutcome::Output(reply))
    }
}

pub struct ListAgents {
    registry: Arc<AgentRegistry>,
}

impl ListAgents {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl CommandHandler for ListAgents {
    fn kind(&self) -> CommandKind {
        CommandKind::ListAgents
    }

    fn label(&self) -> &str {
        "List Agents"
    }

    async fn execute(&self, _command: &Command) -> Result<CommandOutcome, ToolError> {
        let agents = self.registry.list().await;
        if agents.is_empty() {
            return Ok(CommandOutcome::output("No agents running."));
        }
        let lines: Vec<String> = agents.iter().map(|(key, task)| format!("{key}: {task}")).collect();
        Ok(CommandOutcome::Output(lines.join("\n")))
    }
}

pub struct DeleteAgent {
    registry: Arc<AgentRegistry>,
}

impl DeleteAgent {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl CommandHandler for DeleteAgent {
    fn kind(&self) -> CommandKind {
        CommandKind::DeleteAgent
    }

    fn label(&self) -> &str {
        "Delete Agent"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["key"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        let key = parse_key(command)?;
        let text = if self.registry.delete(key).await {
            format!("Agent {key} deleted.")
        } else {
            format!("Agent {key} does not exist.")
        };
        Ok(CommandOutcome::Output(text))
    }
}

/// Register the four sub-agent commands against one shared registry.
pub fn register_agent_commands(
    commands: &mut autolite_core::command::CommandRegistry,
    registry: Arc<AgentRegistry>,
    model: Option<String>,
) {
    commands.register(Box::new(StartAgent::new(registry.clone(), model)));
    commands.register(Box::new(MessageAgent::new(registry.clone())));
    commands.register(Box::new(ListAgents::new(registry.clone())));
    commands.register(Box::new(DeleteAgent::new(registry)));
}
