//! API request and response types

use crate::character::CharacterProfile;
use crate::db::SessionRecord;
use crate::transcript::Turn;
use serde::{Deserialize, Serialize};

/// Request to create a new session
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub title: Option<String>,
    #[serde(default)]
    pub character: CharacterProfile,
}

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Request to replace the content of a turn
#[derive(Debug, Deserialize)]
pub struct EditTurnRequest {
    pub content: String,
}

/// Request to summarize the first `turns` pairs
#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub turns: usize,
}

/// Response with a list of sessions
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionRecord>,
}

/// Response with a single session record
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: SessionRecord,
}

/// Response with a session and its live state
#[derive(Debug, Serialize)]
pub struct SessionWithTurnsResponse {
    pub session: SessionRecord,
    pub turns: Vec<Turn>,
    pub summary: Option<String>,
    pub busy: bool,
}

/// Response for accepted commands
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
