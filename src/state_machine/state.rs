//! Session state types

use crate::character::{CharacterProfile, Speakers};
use crate::history::{project, TurnHistory};
use crate::summary::DEFAULT_PRESERVE_TURNS;
use crate::transcript::Transcript;
use serde::{Deserialize, Serialize};

/// What the session is doing right now
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionPhase {
    /// Ready for input
    #[default]
    Idle,

    /// A reply is streaming in for the user turn at `user_turn`
    Streaming {
        user_turn: usize,
        accumulated: String,
    },

    /// A summary request is in flight
    Summarizing { total_pairs: usize },
}

impl SessionPhase {
    pub fn is_busy(&self) -> bool {
        !matches!(self, SessionPhase::Idle)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Streaming { .. } => "streaming",
            SessionPhase::Summarizing { .. } => "summarizing",
        }
    }
}

/// The session aggregate: transcript, derived history, active summary and
/// the phase of the in-flight request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub transcript: Transcript,
    pub history: TurnHistory,
    pub summary: Option<String>,
    #[serde(default)]
    pub phase: SessionPhase,
}

impl Session {
    pub fn new(transcript: Transcript, history: TurnHistory, summary: Option<String>) -> Self {
        Self {
            transcript,
            history,
            summary,
            phase: SessionPhase::Idle,
        }
    }

    /// A fresh session seeded from a character profile
    pub fn seeded(profile: &CharacterProfile) -> Self {
        let (transcript, history) = profile.seed();
        Self::new(transcript, history, None)
    }

    pub fn is_busy(&self) -> bool {
        self.phase.is_busy()
    }

    /// Recompute the history from the whole transcript
    pub fn reproject(&mut self) {
        self.history = project(self.transcript.turns());
    }
}

/// Immutable per-session configuration
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub system_prompt: String,
    pub speakers: Speakers,
    /// Turn pairs kept verbatim by summarization
    pub preserve_turns: usize,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, profile: &CharacterProfile) -> Self {
        Self {
            session_id: session_id.into(),
            system_prompt: profile.system_prompt(),
            speakers: profile.speakers(),
            preserve_turns: DEFAULT_PRESERVE_TURNS,
        }
    }

    #[must_use]
    pub fn with_preserve_turns(mut self, preserve_turns: usize) -> Self {
        self.preserve_turns = preserve_turns;
        self
    }
}
