//! Token estimation for chat payloads.
//!
//! No vocabulary files are loaded. Text is costed with a character
//! heuristic: ~4 characters per token for GPT-style BPE vocabularies and
//! ~3 for the SentencePiece vocabularies of llama-family models, which split
//! English text finer. Message framing follows the chat wire format, where
//! every message carries a few tokens of role and delimiter overhead.

use autolite_core::message::Message;
use tracing::debug;

/// Model families with a SentencePiece vocabulary.
const SENTENCEPIECE_FAMILIES: &[&str] = &["llama", "mistral", "mixtral", "vicuna", "alpaca", "gemma", "qwen", "phi"];

/// Tokens added to every counted batch for the reply's role priming.
const REPLY_PRIMING: usize = 3;

/// Counts tokens the way a given model would be billed for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCounter {
    chars_per_token: usize,
    per_message: isize,
    per_name: isize,
}

impl TokenCounter {
    /// Resolve encoding and framing for `model`. Never fails; unknown ids
    /// use the default BPE encoding.
    pub fn for_model(model: &str) -> Self {
        let lower = model.to_ascii_lowercase();

        let (per_message, per_name) = if lower == "gpt-3.5-turbo-0301" { (4, -1) } else { (3, 1) };

        let chars_per_token = if SENTENCEPIECE_FAMILIES.iter().any(|f| lower.contains(f)) {
            3
        } else {
            if !lower.starts_with("gpt-") {
                debug!(model, "Unknown model id, using default token encoding");
            }
            4
        };

        Self {
            chars_per_token,
            per_message,
            per_name,
        }
    }

    /// Estimated tokens for raw text, rounded up.
    pub fn count_text(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }

    fn count_message(&self, message: &Message) -> isize {
        let mut tokens = self.per_message
            + self.count_text(message.role.as_str()) as isize
            + self.count_text(&message.content) as isize;
        if let Some(name) = &message.name {
            tokens += self.count_text(name) as isize + self.per_name;
        }
        tokens
    }

    /// Tokens for a batch of messages, including reply priming.
    pub fn count_messages(&self, messages: &[Message]) -> usize {
        let framed: isize = messages.iter().map(|m| self.count_message(m)).sum();
        (framed.max(0) as usize) + REPLY_PRIMING
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::for_model("gpt-3.5-turbo")
    }
}
