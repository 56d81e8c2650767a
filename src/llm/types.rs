//! Common types for LLM interactions

use crate::history::HistoryEntry;
use serde::{Deserialize, Serialize};

/// A single generation request.
///
/// `history` is the context that precedes `prompt`; the prompt is sent as the
/// final user entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub history: Vec<HistoryEntry>,
    pub prompt: String,
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(
        system_prompt: impl Into<String>,
        history: Vec<HistoryEntry>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history,
            prompt: prompt.into(),
            max_tokens: None,
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// History followed by the prompt as a user entry
    pub fn contents(&self) -> Vec<HistoryEntry> {
        let mut contents = self.history.clone();
        contents.push(HistoryEntry::user(self.prompt.clone()));
        contents
    }
}

/// Response from a non-streaming request
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Usage,
}

/// Token usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
