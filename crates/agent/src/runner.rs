//! The autonomous loop: ask the model for a command, run it, record the
//! result, get feedback, repeat.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use autolite_core::command::{CommandOutcome, CommandRegistry};
use autolite_core::memory::{ERROR_MARKER, MemoryBackend};
use autolite_core::message::Message;
use tracing::{error, info, warn};

use crate::context::assembler::{ChatOutcome, ContextAssembler};
use crate::parser::{CommandParser, ParsedReply};

/// The instruction sent when there is no human feedback.
pub const DEFAULT_INSTRUCTION: &str = "Determine the next command to use, and respond using the JSON format specified.";

/// Where human feedback comes from between cycles.
#[async_trait]
pub trait FeedbackSource: Send {
    /// The next line of feedback. `None` means the source is closed, which
    /// ends the run like `exit`.
    async fn next_feedback(&mut self) -> Option<String>;
}

/// Feedback from a fixed list, for tests and scripted runs.
#[derive(Debug, Default)]
pub struct ScriptedFeedback {
    lines: VecDeque<String>,
}

impl ScriptedFeedback {
    pub fn new(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl FeedbackSource for ScriptedFeedback {
    async fn next_feedback(&mut self) -> Option<String> {
        self.lines.pop_front()
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The agent issued `task_complete`.
    TaskComplete { reason: String },
    /// Continuous mode hit its cycle limit.
    LimitReached { limit: u32 },
    /// The human typed `exit` or feedback ran out.
    UserExit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Cycles that reached the model.
    pub cycles: u32,
    pub stop: StopReason,
}

/// Loop settings.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub token_limit: usize,
    pub continuous: bool,
    /// 0 means unlimited.
    pub continuous_limit: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            token_limit: 8000,
            continuous: false,
            continuous_limit: 0,
        }
    }
}

/// Drives one agent from its system prompt to a stop.
pub struct AgentLoop {
    prompt: String,
    assembler: ContextAssembler,
    parser: CommandParser,
    commands: Arc<CommandRegistry>,
    memory: Arc<dyn MemoryBackend>,
    settings: LoopSettings,
}

impl AgentLoop {
    pub fn new(
        prompt: impl Into<String>,
        assembler: ContextAssembler,
        parser: CommandParser,
        commands: Arc<CommandRegistry>,
        memory: Arc<dyn MemoryBackend>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            assembler,
            parser,
            commands,
            memory,
            settings: LoopSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Run until the agent completes, the limit is hit, or the human exits.
    pub async fn run(&self, history: &mut Vec<Message>, feedback: &mut dyn FeedbackSource) -> RunSummary {
        let mut user_input = DEFAULT_INSTRUCTION.to_string();
        let mut cycle: u32 = 0;

        loop {
            cycle += 1;
            let limit = self.settings.continuous_limit;
            if self.settings.continuous && limit > 0 && cycle > limit {
                info!(limit, "Continuous limit reached");
                return RunSummary {
                    cycles: cycle - 1,
                    stop: StopReason::LimitReached { limit },
                };
            }

            if let Some(reason) = self.cycle(&user_input, history).await {
                info!(reason = %reason, "Task complete");
                return RunSummary {
                    cycles: cycle,
                    stop: StopReason::TaskComplete { reason },
                };
            }

            if self.settings.continuous {
                continue;
            }

            let line = match feedback.next_feedback().await {
                Some(line) if !line.trim().eq_ignore_ascii_case("exit") => line,
                _ => {
                    info!("Exiting at user request");
                    return RunSummary {
                        cycles: cycle,
                        stop: StopReason::UserExit,
                    };
                }
            };

            self.remember(&format!("Human feedback: {line}")).await;
            user_input = if line.trim().is_empty() {
                DEFAULT_INSTRUCTION.to_string()
            } else {
                line
            };
        }
    }

    /// One model round trip. Returns the shutdown reason if the agent
    /// finished.
    async fn cycle(&self, user_input: &str, history: &mut Vec<Message>) -> Option<String> {
        let outcome = self
            .assembler
            .chat(&self.prompt, user_input, history, self.settings.token_limit)
            .await;

        let reply = match &outcome {
            ChatOutcome::Reply { text, .. } => text.clone(),
            ChatOutcome::RetriesExhausted { .. } => {
                let sentinel = outcome.reply_text();
                error!(error = %sentinel, "No reply from the model this cycle");
                history.push(Message::system(format!("{ERROR_MARKER} {sentinel}")));
                return None;
            }
        };

        let ParsedReply { thoughts, command } = match self.parser.parse(&reply).await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(command = e.command_name(), error = %e, "Invalid command in reply");
                history.push(Message::system(format!("{ERROR_MARKER} {e}")));
                return None;
            }
        };

        if let Some(t) = &thoughts {
            info!(
                thoughts = t.text.as_deref().unwrap_or_default(),
                reasoning = t.reasoning.as_deref().unwrap_or_default(),
                plan = t.plan.as_deref().unwrap_or_default(),
                criticism = t.criticism.as_deref().unwrap_or_default(),
                speak = t.speak.as_deref().unwrap_or_default(),
                "Agent thoughts"
            );
        }
        info!(command = %command.name, args = ?command.args, "Executing command");

        match self.commands.dispatch(&command).await {
            CommandOutcome::Shutdown { reason } => Some(reason),
            CommandOutcome::Output(result) => {
                let entry = format!("Command {} returned: {result}", command.name);
                info!(command = %command.name, chars = result.len(), "Command finished");
                self.remember(&entry).await;
                history.push(Message::system(entry));
                None
            }
        }
    }

    async fn remember(&self, text: &str) {
        if let Err(e) = self.memory.add(text).await {
            warn!(error = %e, "Failed to add to memory");
        }
    }
}
