//! Context assembly: turns the system prompt, recalled memories, the
//! running history and the next user input into one completion request.
//!
//! # Payload layout
//!
//! | Position | Content | Trim strategy |
//! |----------|---------|---------------|
//! | 1 | System prompt | Never trimmed |
//! | 2 | Current local time | Never trimmed |
//! | 3 | Recalled memories | Least relevant dropped first, down to none |
//! | 4.. | History (chronological) | Oldest turns dropped |
//! | last | New user input | Never trimmed |
//!
//! The preamble (positions 1-3) is capped at a fixed ceiling and never
//! crowds the new input out of the send budget. History then fills the send
//! budget newest-first; whatever remains of the model window becomes the
//! reply's `max_tokens`. A system prompt too large for the send budget is a
//! [`Error::ContextOverflow`] rather than a request with no room to reply.

use std::sync::Arc;
use std::time::Duration;

use autolite_config::AppConfig;
use autolite_core::error::Error;
use autolite_core::memory::MemoryBackend;
use autolite_core::message::{Message, transcript};
use autolite_core::provider::{CompletionClient, CompletionRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::context::token::TokenCounter;

// ── Types ─────────────────────────────────────────────────────────────────

/// Assembly knobs.
#[derive(Debug, Clone)]
pub struct AssemblyConfig {
    /// Snippets requested from memory per call.
    pub relevant_k: usize,
    /// History messages that form the relevance query.
    pub history_window: usize,
    /// Maximum tokens for the three preamble messages.
    pub preamble_ceiling: usize,
    /// Tokens held back from the send budget for the reply.
    pub reply_reserve: usize,
    /// Sampling temperature for the main completion.
    pub temperature: f32,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            relevant_k: 10,
            history_window: 9,
            preamble_ceiling: 2500,
            reply_reserve: 1000,
            temperature: 1.0,
        }
    }
}

impl AssemblyConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            relevant_k: config.context.relevant_k,
            history_window: config.context.history_window,
            preamble_ceiling: config.context.preamble_ceiling,
            reply_reserve: config.context.reply_reserve,
            temperature: config.llm.temperature,
        }
    }
}

/// Bounded retry for a whole assembly + completion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.context.max_attempts.max(1),
            backoff: Duration::from_secs(config.context.retry_backoff_secs),
        }
    }
}

/// What was sent, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Tokens in the assembled payload.
    pub tokens_used: usize,
    /// `token_limit - tokens_used`; the reply's `max_tokens`.
    pub tokens_remaining: usize,
    /// History messages that fit the send budget.
    pub history_included: usize,
    /// Memory snippets that fit the preamble ceiling and the send budget.
    pub snippets_included: usize,
}

/// Result of [`ContextAssembler::chat`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    Reply { text: String, metadata: AssemblyMetadata },
    RetriesExhausted { attempts: u32, last_error: String },
}

impl ChatOutcome {
    /// The assistant reply, or a sentinel error line after exhaustion.
    pub fn reply_text(&self) -> String {
        match self {
            ChatOutcome::Reply { text, .. } => text.clone(),
            ChatOutcome::RetriesExhausted { attempts, last_error } => {
                format!("Error: completion failed after {attempts} attempts: {last_error}")
            }
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, ChatOutcome::Reply { .. })
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Builds payloads and drives the main completion client.
pub struct ContextAssembler {
    completion: Arc<dyn CompletionClient>,
    memory: Arc<dyn MemoryBackend>,
    counter: TokenCounter,
    config: AssemblyConfig,
    retry: RetryPolicy,
}

impl ContextAssembler {
    pub fn new(completion: Arc<dyn CompletionClient>, memory: Arc<dyn MemoryBackend>) -> Self {
        let counter = TokenCounter::for_model(completion.default_model());
        Self {
            completion,
            memory,
            counter,
            config: AssemblyConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_config(mut self, config: AssemblyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_counter(mut self, counter: TokenCounter) -> Self {
        self.counter = counter;
        self
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    /// Send `user_input` with as much context as fits in `token_limit`.
    ///
    /// On success the user input and the reply are appended to `history`.
    /// Failures are retried per the [`RetryPolicy`]; after the last attempt
    /// `history` is left untouched.
    pub async fn chat(
        &self,
        system_prompt: &str,
        user_input: &str,
        history: &mut Vec<Message>,
        token_limit: usize,
    ) -> ChatOutcome {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempts = 0;
        let mut last_error = String::new();

        while attempts < max_attempts {
            attempts += 1;
            match self.attempt(system_prompt, user_input, history, token_limit).await {
                Ok((text, metadata)) => {
                    history.push(Message::user(user_input));
                    history.push(Message::assistant(text.clone()));
                    return ChatOutcome::Reply { text, metadata };
                }
                // the payload would be identical on every retry
                Err(e @ Error::ContextOverflow { .. }) => {
                    last_error = e.to_string();
                    break;
                }
                Err(e) => {
                    warn!(attempt = attempts, of = max_attempts, error = %e, "Chat attempt failed");
                    last_error = e.to_string();
                    if attempts < max_attempts {
                        tokio::time::sleep(self.retry.backoff).await;
                    }
                }
            }
        }

        error!(attempts, error = %last_error, "Chat retries exhausted");
        ChatOutcome::RetriesExhausted { attempts, last_error }
    }

    async fn attempt(
        &self,
        system_prompt: &str,
        user_input: &str,
        history: &[Message],
        token_limit: usize,
    ) -> Result<(String, AssemblyMetadata), Error> {
        let (messages, metadata) = self.assemble(system_prompt, user_input, history, token_limit).await?;

        debug!(
            tokens_used = metadata.tokens_used,
            tokens_remaining = metadata.tokens_remaining,
            history_included = metadata.history_included,
            snippets_included = metadata.snippets_included,
            "Context assembled"
        );

        let request = CompletionRequest::new(messages)
            .with_max_tokens(u32::try_from(metadata.tokens_remaining).unwrap_or(u32::MAX))
            .with_temperature(self.config.temperature);
        let reply = self.completion.complete(request).await?;
        Ok((reply, metadata))
    }

    /// Build the payload without sending it.
    pub async fn assemble(
        &self,
        system_prompt: &str,
        user_input: &str,
        history: &[Message],
        token_limit: usize,
    ) -> Result<(Vec<Message>, AssemblyMetadata), Error> {
        let mut snippets = if history.is_empty() {
            Vec::new()
        } else {
            let start = history.len().saturating_sub(self.config.history_window);
            let query = transcript(&history[start..]);
            self.memory.get_relevant(&query, self.config.relevant_k).await?
        };

        let send_budget = token_limit.saturating_sub(self.config.reply_reserve);
        let input = Message::user(user_input);
        let input_cost = self.counter.count_messages(std::slice::from_ref(&input));
        let ceiling = self.config.preamble_ceiling.min(send_budget.saturating_sub(input_cost));

        let mut preamble = build_preamble(system_prompt, &snippets);
        let mut tokens_used = self.counter.count_messages(&preamble);
        while tokens_used > ceiling && !snippets.is_empty() {
            snippets.remove(0);
            preamble = build_preamble(system_prompt, &snippets);
            tokens_used = self.counter.count_messages(&preamble);
        }

        tokens_used += input_cost;
        if tokens_used > send_budget {
            return Err(Error::ContextOverflow {
                needed: tokens_used,
                budget: send_budget,
            });
        }

        let mut included = Vec::new();
        for message in history.iter().rev() {
            let cost = self.counter.count_messages(std::slice::from_ref(message));
            if tokens_used + cost > send_budget {
                break;
            }
            tokens_used += cost;
            included.push(message.clone());
        }

        let metadata = AssemblyMetadata {
            tokens_used,
            tokens_remaining: token_limit.saturating_sub(tokens_used),
            history_included: included.len(),
            snippets_included: snippets.len(),
        };

        let mut messages = preamble;
        messages.extend(included.into_iter().rev());
        messages.push(input);
        Ok((messages, metadata))
    }
}

fn build_preamble(system_prompt: &str, snippets: &[String]) -> Vec<Message> {
    vec![
        Message::system(system_prompt),
        Message::system(format!(
            "The current time and date is {}",
            chrono::Local::now().format("%c")
        )),
        Message::system(format!(
            "This reminds you of these events from your past:\n{}\n\n",
            snippets.join("\n")
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{BrokenMemory, RecordingMemory, ScriptedClient};
    use autolite_core::error::ProviderError;
    use autolite_core::message::Role;

    fn no_wait() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::ZERO,
        }
    }

    fn history_of(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("question number {i} with some padding text"))
                } else {
                    Message::assistant(format!("answer number {i} with some padding text"))
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn empty_history_skips_memory_and_sends_preamble_plus_input() {
        let client = ScriptedClient::replies(&["{}"]);
        let memory = RecordingMemory::with_snippets(&["should not appear"]);
        let assembler = ContextAssembler::new(client.clone(), memory.clone()).with_retry(no_wait());

        let mut history = Vec::new();
        let outcome = assembler.chat("You are a test.", "go", &mut history, 4000).await;

        assert!(outcome.is_reply());
        assert!(memory.queries().is_empty());
        assert_eq!(client.calls(), 1);

        let sent = &client.requests()[0].messages;
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].content, "You are a test.");
        assert!(sent[1].content.starts_with("The current time and date is "));
        assert_eq!(sent[2].content, "This reminds you of these events from your past:\n\n\n");
        assert_eq!(sent[3], Message::user("go"));

        assert_eq!(history, vec![Message::user("go"), Message::assistant("{}")]);
    }

    #[tokio::test]
    async fn relevance_query_uses_recent_window() {
        let client = ScriptedClient::replies(&["ok"]);
        let memory = RecordingMemory::with_snippets(&["alpha", "beta"]);
        let assembler = ContextAssembler::new(client.clone(), memory.clone())
            .with_config(AssemblyConfig {
                history_window: 2,
                relevant_k: 7,
                ..AssemblyConfig::default()
            })
            .with_retry(no_wait());

        let mut history = vec![Message::user("old"), Message::user("mid"), Message::assistant("new")];
        assembler.chat("sys", "next", &mut history, 4000).await;

        let queries = memory.queries();
        assert_eq!(queries, vec![("user: mid\nassistant: new".to_string(), 7)]);
        let sent = &client.requests()[0].messages;
        assert_eq!(sent[2].content, "This reminds you of these events from your past:\nalpha\nbeta\n\n");
    }

    #[tokio::test]
    async fn preamble_ceiling_drops_front_snippets() {
        let long = "x".repeat(400);
        let client = ScriptedClient::replies(&["ok"]);
        let memory = RecordingMemory::with_snippets(&[&long, &long, "keep me"]);
        let assembler = ContextAssembler::new(client.clone(), memory)
            .with_config(AssemblyConfig {
                preamble_ceiling: 100,
                ..AssemblyConfig::default()
            })
            .with_retry(no_wait());

        let (messages, meta) = assembler
            .assemble("sys", "next", &[Message::user("hi")], 4000)
            .await
            .unwrap();
        assert_eq!(meta.snippets_included, 1);
        assert!(messages[2].content.contains("keep me"));
        assert!(!messages[2].content.contains("xxxx"));
    }

    #[tokio::test]
    async fn oversized_prompt_still_terminates_with_no_snippets() {
        let client = ScriptedClient::replies(&["ok"]);
        let memory = RecordingMemory::with_snippets(&["a", "b"]);
        let assembler = ContextAssembler::new(client, memory)
            .with_config(AssemblyConfig {
                preamble_ceiling: 10,
                ..AssemblyConfig::default()
            })
            .with_retry(no_wait());

        let big_prompt = "p".repeat(1000);
        let (_, meta) = assembler
            .assemble(&big_prompt, "next", &[Message::user("hi")], 4000)
            .await
            .unwrap();
        assert_eq!(meta.snippets_included, 0);
    }

    #[tokio::test]
    async fn small_window_trims_snippets_to_send_budget() {
        let long = "m".repeat(2000);
        let client = ScriptedClient::replies(&["ok"]);
        let memory = RecordingMemory::with_snippets(&[&long, &long, &long, &long]);
        let assembler = ContextAssembler::new(client.clone(), memory).with_retry(no_wait());

        let mut history = vec![Message::user("hi")];
        let outcome = assembler.chat("sys", "next", &mut history, 2000).await;
        let ChatOutcome::Reply { metadata, .. } = outcome else {
            panic!("expected a reply");
        };

        assert!(metadata.tokens_used <= 2000 - 1000);
        assert_eq!(metadata.snippets_included, 1);
        assert!(metadata.tokens_remaining >= 1000);
        assert_eq!(client.requests()[0].max_tokens, Some(metadata.tokens_remaining as u32));
    }

    #[tokio::test]
    async fn prompt_larger_than_send_budget_is_not_sent() {
        let client = ScriptedClient::replies(&["never sent"]);
        let assembler =
            ContextAssembler::new(client.clone(), RecordingMemory::with_snippets(&[])).with_retry(no_wait());

        let big_prompt = "p".repeat(8000);
        let err = assembler.assemble(&big_prompt, "next", &[], 2000).await.unwrap_err();
        assert!(matches!(err, Error::ContextOverflow { budget: 1000, .. }));

        let mut history = Vec::new();
        let outcome = assembler.chat(&big_prompt, "next", &mut history, 2000).await;
        assert!(matches!(outcome, ChatOutcome::RetriesExhausted { attempts: 1, .. }));
        assert!(outcome.reply_text().contains("Context overflow"));
        assert_eq!(client.calls(), 0);
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn history_fills_budget_newest_first() {
        let client = ScriptedClient::replies(&["ok"]);
        let memory = RecordingMemory::with_snippets(&[]);
        let assembler = ContextAssembler::new(client.clone(), memory)
            .with_config(AssemblyConfig {
                reply_reserve: 100,
                ..AssemblyConfig::default()
            })
            .with_retry(no_wait());

        let history = history_of(40);
        let token_limit = 250;
        let (messages, meta) = assembler.assemble("sys", "next", &history, token_limit).await.unwrap();

        assert!(meta.history_included > 0);
        assert!(meta.history_included < history.len());
        assert!(meta.tokens_used <= token_limit - 100);
        assert_eq!(meta.tokens_remaining, token_limit - meta.tokens_used);

        // chronological, ending with the newest history message, then the input
        let included = &messages[3..messages.len() - 1];
        assert_eq!(included, &history[history.len() - meta.history_included..]);
        assert_eq!(messages.last().unwrap(), &Message::user("next"));
    }

    #[tokio::test]
    async fn payload_never_exceeds_send_budget() {
        let memory = RecordingMemory::with_snippets(&["remembered fact"]);
        let history = history_of(60);
        for token_limit in [1200usize, 1500, 2000, 4000] {
            let client = ScriptedClient::replies(&["ok"]);
            let assembler = ContextAssembler::new(client.clone(), memory.clone()).with_retry(no_wait());
            let (messages, meta) = assembler.assemble("sys", "next", &history, token_limit).await.unwrap();
            assert!(meta.tokens_used <= token_limit - 1000);

            let counter = assembler.counter();
            let preamble = counter.count_messages(&messages[..3]);
            let rest: usize = messages[3..]
                .iter()
                .map(|m| counter.count_messages(std::slice::from_ref(m)))
                .sum();
            assert_eq!(preamble + rest, meta.tokens_used);
        }
    }

    #[tokio::test]
    async fn max_tokens_is_remaining_window() {
        let client = ScriptedClient::replies(&["ok"]);
        let assembler =
            ContextAssembler::new(client.clone(), RecordingMemory::with_snippets(&[])).with_retry(no_wait());
        let mut history = Vec::new();
        let outcome = assembler.chat("sys", "go", &mut history, 3000).await;

        let ChatOutcome::Reply { metadata, .. } = outcome else {
            panic!("expected a reply");
        };
        let request = &client.requests()[0];
        assert_eq!(request.max_tokens, Some(metadata.tokens_remaining as u32));
        assert_eq!(request.temperature, 1.0);
        assert_eq!(request.messages[0].role, Role::System);
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let client = ScriptedClient::new(vec![
            Err(ProviderError::Network("connection reset".into())),
            Ok("recovered".into()),
        ]);
        let assembler =
            ContextAssembler::new(client.clone(), RecordingMemory::with_snippets(&[])).with_retry(no_wait());
        let mut history = Vec::new();
        let outcome = assembler.chat("sys", "go", &mut history, 4000).await;
        assert_eq!(outcome.reply_text(), "recovered");
        assert_eq!(client.calls(), 2);
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn exhaustion_returns_sentinel_and_keeps_history() {
        let client = ScriptedClient::new(vec![]);
        let assembler =
            ContextAssembler::new(client.clone(), RecordingMemory::with_snippets(&[])).with_retry(no_wait());
        let mut history = vec![Message::user("earlier")];
        let outcome = assembler.chat("sys", "go", &mut history, 4000).await;

        assert!(matches!(outcome, ChatOutcome::RetriesExhausted { attempts: 3, .. }));
        assert!(
            outcome
                .reply_text()
                .starts_with("Error: completion failed after 3 attempts:")
        );
        assert_eq!(client.calls(), 3);
        assert_eq!(history, vec![Message::user("earlier")]);
    }

    #[tokio::test]
    async fn memory_failure_counts_as_attempt() {
        let client = ScriptedClient::replies(&["never sent"]);
        let assembler = ContextAssembler::new(client.clone(), Arc::new(BrokenMemory)).with_retry(no_wait());
        let mut history = vec![Message::user("earlier")];
        let outcome = assembler.chat("sys", "go", &mut history, 4000).await;

        assert!(!outcome.is_reply());
        assert!(outcome.reply_text().contains("embedder offline"));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_waits_between_attempts() {
        let client = ScriptedClient::new(vec![Err(ProviderError::Timeout("slow".into())), Ok("ok".into())]);
        let assembler = ContextAssembler::new(client, RecordingMemory::with_snippets(&[])).with_retry(RetryPolicy {
            max_attempts: 2,
            backoff: Duration::from_secs(10),
        });
        let started = tokio::time::Instant::now();
        let mut history = Vec::new();
        assembler.chat("sys", "go", &mut history, 4000).await;
        assert!(started.elapsed() >= Duration::from_secs(10));
    }
}
