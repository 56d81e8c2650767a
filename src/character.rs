//! Character profiles and session bootstrap
//!
//! A profile is a flat string-keyed record supplied when a session is
//! created. It seeds the system prompt, the optional prolog turn, the opening
//! cue of the first history, and the speaker names used when a
//! transcript is rendered for summarization.

use crate::history::{project_with_opening, TurnHistory, START_MARKER};
use crate::transcript::{Transcript, Turn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

/// System prompt used when a profile carries no prompt fields
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

const DEFAULT_CHARACTER_NAME: &str = "Character";
const DEFAULT_USER_NAME: &str = "User";

/// Flat character profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterProfile {
    fields: BTreeMap<String, String>,
}

impl CharacterProfile {
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Trimmed, non-empty field value
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.field("name")
    }

    pub fn prolog(&self) -> Option<&str> {
        self.field("prolog")
    }

    pub fn start_situation(&self) -> Option<&str> {
        self.field("start_situation")
    }

    /// Opening cue for the seeded history. Later projections use `[start]`.
    pub fn opening(&self) -> String {
        match self.start_situation() {
            Some(situation) => format!("[Start situation: {situation}]"),
            None => START_MARKER.to_string(),
        }
    }

    pub fn speakers(&self) -> Speakers {
        Speakers {
            user: self.field("profile_name").unwrap_or(DEFAULT_USER_NAME).to_string(),
            character: self.name().unwrap_or(DEFAULT_CHARACTER_NAME).to_string(),
        }
    }

    /// Build the system prompt from the prompt fields of the profile
    pub fn system_prompt(&self) -> String {
        let prompt = self.field("prompt");
        let profile_name = self.field("profile_name");
        let profile_detail = self.field("profile_detail");
        let start_option = self.field("start_option");

        if prompt.is_none() && profile_name.is_none() && profile_detail.is_none() {
            return DEFAULT_SYSTEM_PROMPT.to_string();
        }

        let mut out = String::new();
        if let Some(name) = self.name() {
            let _ = writeln!(out, "You are {name}. Stay in character for the whole conversation.");
        }
        if let Some(prompt) = prompt {
            let _ = write!(out, "\n{prompt}\n");
        }
        if profile_name.is_some() || profile_detail.is_some() {
            out.push_str("\n## The user\n");
            if let Some(name) = profile_name {
                let _ = writeln!(out, "Name: {name}");
            }
            if let Some(detail) = profile_detail {
                let _ = writeln!(out, "{detail}");
            }
        }
        if let Some(option) = start_option {
            let _ = write!(out, "\n## Opening\n{option}\n");
        }
        out.trim().to_string()
    }

    /// Initial transcript and history for a new session.
    ///
    /// With a prolog the transcript starts with one assistant turn and the
    /// history pairs it with the opening cue.
    pub fn seed(&self) -> (Transcript, TurnHistory) {
        let mut transcript = Transcript::new();
        if let Some(prolog) = self.prolog() {
            transcript.append(Turn::assistant(prolog));
        }
        let history = project_with_opening(transcript.turns(), &self.opening());
        (transcript, history)
    }
}

/// Display names used when rendering dialogue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Speakers {
    pub user: String,
    pub character: String,
}

impl Default for Speakers {
    fn default() -> Self {
        Self {
            user: DEFAULT_USER_NAME.to_string(),
            character: DEFAULT_CHARACTER_NAME.to_string(),
        }
    }
}
