//! Transcript store
//!
//! The canonical, ordered record of every turn in a session. Turns are only
//! ever appended, edited in place, removed, or replaced wholesale by
//! summarization; they are never reordered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One message in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Stable opaque id; operations still address turns by position
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Set only on the synthetic turn produced by summarization
    #[serde(default)]
    pub is_summary: bool,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            is_summary: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// The synthetic assistant turn carrying a compressed summary
    pub fn summary(content: impl Into<String>) -> Self {
        Self {
            is_summary: true,
            ..Self::new(Role::Assistant, content)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("Turn index {index} is out of range (transcript has {len} turns)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Ordered sequence of turns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Replace the content of the turn at `index`, keeping role, timestamp and
    /// summary flag.
    pub fn update(
        &mut self,
        index: usize,
        content: impl Into<String>,
    ) -> Result<(), TranscriptError> {
        let len = self.turns.len();
        let turn = self
            .turns
            .get_mut(index)
            .ok_or(TranscriptError::IndexOutOfRange { index, len })?;
        turn.content = content.into();
        Ok(())
    }

    /// Remove the turn at `index`. Every later turn moves down one position.
    pub fn remove_at(&mut self, index: usize) -> Result<Turn, TranscriptError> {
        self.check_index(index)?;
        Ok(self.turns.remove(index))
    }

    pub fn replace_all(&mut self, turns: Vec<Turn>) {
        self.turns = turns;
    }

    pub fn check_index(&self, index: usize) -> Result<(), TranscriptError> {
        if index < self.turns.len() {
            Ok(())
        } else {
            Err(TranscriptError::IndexOutOfRange {
                index,
                len: self.turns.len(),
            })
        }
    }

    pub fn get(&self, index: usize) -> Option<&Turn> {
        self.turns.get(index)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[cfg(test)]
    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
