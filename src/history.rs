//! Turn-history projection
//!
//! Derives the API-facing role sequence from the transcript. The history is
//! never edited by hand except for the optimistic user entry and committed
//! model entry added around a streamed reply, and the synthetic summary pair
//! appended by compaction.

use crate::transcript::{Role, Turn};
use serde::{Deserialize, Serialize};

/// Opening cue used when the derived history would start with the model
pub const START_MARKER: &str = "[start]";

/// User request paired with the summary inside the live context
pub const SUMMARY_REQUEST: &str = "Summarize the conversation so far.";

/// Role as the inference API sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    User,
    Model,
}

/// One single-part text entry of the history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub text: String,
}

impl HistoryEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::Model,
            text: text.into(),
        }
    }
}

/// Ordered API-facing history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnHistory {
    entries: Vec<HistoryEntry>,
}

impl TurnHistory {
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn first(&self) -> Option<&HistoryEntry> {
        self.entries.first()
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Append the synthetic request/summary pair that keeps a compressed
    /// narrative inside the live context.
    #[must_use]
    pub fn with_summary(mut self, summary: &str) -> Self {
        self.entries.push(HistoryEntry::user(SUMMARY_REQUEST));
        self.entries.push(HistoryEntry::model(summary));
        self
    }
}

/// Project a transcript using the default `[start]` opening cue
pub fn project(turns: &[Turn]) -> TurnHistory {
    project_with_opening(turns, START_MARKER)
}

/// Project a transcript into an alternating history.
///
/// Summary turns are skipped. If the result starts with the model, a user
/// entry carrying `opening` is prepended so the first role is always `User`.
pub fn project_with_opening(turns: &[Turn], opening: &str) -> TurnHistory {
    let mut entries: Vec<HistoryEntry> = turns
        .iter()
        .filter(|turn| !turn.is_summary)
        .map(|turn| match turn.role {
            Role::User => HistoryEntry::user(turn.content.clone()),
            Role::Assistant => HistoryEntry::model(turn.content.clone()),
        })
        .collect();

    if entries.first().is_some_and(|e| e.role == HistoryRole::Model) {
        entries.insert(0, HistoryEntry::user(opening));
    }

    TurnHistory { entries }
}
