//! Per-cycle context assembly.
//!
//! # Context Layers (in payload order)
//!
//! | Layer | Source | Trim Strategy |
//! |-------|--------|---------------|
//! | 1. System prompt | `PromptBuilder` | Never trimmed |
//! | 2. Clock | Local time | Never trimmed |
//! | 3. Recalled memories | Memory backend | Least relevant dropped first |
//! | 4. Conversation History | Recent turns | Oldest turns dropped |
//! | 5. User input | Feedback or default instruction | Never trimmed |

pub mod assembler;
pub mod token;

pub use assembler::{AssemblyConfig, AssemblyMetadata, ChatOutcome, ContextAssembler, RetryPolicy};
pub use token::TokenCounter;
