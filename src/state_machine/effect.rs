//! Effects produced by state transitions

use crate::llm::LlmRequest;
use serde::Serialize;

/// Severity of a user-visible status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Success,
    Info,
    Warning,
    Error,
}

/// How a streamed reply ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamOutcome {
    Committed,
    RolledBack,
}

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Save transcript, history and summary
    PersistSession,

    /// Open a streaming completion
    RequestStream { request: LlmRequest },

    /// Make a non-streaming summary request
    RequestSummary { request: LlmRequest },

    /// Clear the display and render the whole transcript
    Render,

    /// Show the partial reply accumulated so far
    RenderDelta { text: String },

    /// Show a status line
    NotifyStatus { kind: StatusKind, message: String },

    /// A streamed reply reached a terminal state
    StreamFinished { outcome: StreamOutcome },

    /// Present a freshly produced summary
    ShowSummary { text: String },
}

impl Effect {
    pub fn success(message: impl Into<String>) -> Self {
        Effect::NotifyStatus {
            kind: StatusKind::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Effect::NotifyStatus {
            kind: StatusKind::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Effect::NotifyStatus {
            kind: StatusKind::Error,
            message: message.into(),
        }
    }
}
