//! Summarization engine
//!
//! Compresses a long transcript into one synthetic summary turn while keeping
//! a tail of recent turns verbatim. Summaries compound: an active summary is
//! fed back in as context for the next one.
//!
//! Everything here is pure. The network call sits between [`build_prompt`]
//! and [`compact`] and is driven by the session runtime.

use crate::character::Speakers;
use crate::history::{project, TurnHistory};
use crate::transcript::{Role, Turn};
use std::fmt::Write;
use thiserror::Error;

/// Turn pairs kept verbatim at the end of the transcript
pub const DEFAULT_PRESERVE_TURNS: usize = 10;

pub const SUMMARY_SYSTEM_PROMPT: &str = r"You summarize role-play and chat transcripts.

Write a faithful, compact summary of the conversation you are given. Keep:
- names, relationships and how they changed
- important events in order
- promises, open threads and unresolved questions
- the current situation at the end of the conversation

If a previous summary is included, merge it with the latest conversation into one summary. Write in the language of the conversation. Output only the summary.";

/// Output cap for summary requests
pub const SUMMARY_MAX_TOKENS: u32 = 8192;

const PREVIOUS_SUMMARY_MARKER: &str = "[Previous summary]";
const LATEST_CONVERSATION_MARKER: &str = "[Latest conversation]";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummaryError {
    #[error("There is not enough conversation to summarize")]
    EmptySession,
    #[error("Choose between 1 and {max} turns to summarize (got {requested})")]
    InvalidRange { requested: usize, max: usize },
}

/// Check a summarization request against a transcript of `len` turns.
///
/// Returns the number of complete turn pairs on success.
pub fn validate(len: usize, requested: usize) -> Result<usize, SummaryError> {
    let total_pairs = len / 2;
    if total_pairs == 0 {
        return Err(SummaryError::EmptySession);
    }
    if requested == 0 || requested > total_pairs {
        return Err(SummaryError::InvalidRange {
            requested,
            max: total_pairs,
        });
    }
    Ok(total_pairs)
}

/// Render the whole transcript as plain dialogue, one block per turn.
///
/// The summary turn is rendered like any other, so edits to it reach the
/// next summarization.
pub fn render_dialogue(turns: &[Turn], speakers: &Speakers) -> String {
    let mut out = String::new();
    for turn in turns {
        let speaker = match turn.role {
            Role::User => &speakers.user,
            Role::Assistant => &speakers.character,
        };
        let _ = write!(out, "{speaker}: {}\n\n", turn.content);
    }
    out
}

/// Combine the rendered dialogue with the previous summary, if any
pub fn build_prompt(dialogue: &str, prior: Option<&str>) -> String {
    match prior {
        Some(prior) => format!(
            "{PREVIOUS_SUMMARY_MARKER}\n{prior}\n\n{LATEST_CONVERSATION_MARKER}\n{dialogue}"
        ),
        None => dialogue.to_string(),
    }
}

/// Index where the verbatim tail begins.
///
/// Starts `preserve_turns * 2` turns from the end and moves forward until it
/// lands on a user turn, so the window never opens mid-pair.
pub fn recent_window_start(turns: &[Turn], preserve_turns: usize) -> usize {
    let len = turns.len();
    let preserve = preserve_turns.saturating_mul(2).min(len);
    let mut start = len - preserve;
    while start < len && turns[start].role != Role::User {
        start += 1;
    }
    start
}

/// Display text of the summary turn
pub fn summary_label(total_pairs: usize, summary: &str) -> String {
    format!("📝 **Conversation summary (turns 1-{total_pairs})**\n\n{summary}")
}

/// Result of compacting a transcript around a fresh summary
#[derive(Debug, Clone)]
pub struct Compaction {
    pub transcript: Vec<Turn>,
    pub history: TurnHistory,
    /// Number of verbatim turns kept
    pub preserved: usize,
}

/// Replace everything before the recent window with one summary turn.
///
/// The new transcript is the recent window followed by the summary turn. The
/// new history is the projection of the recent window plus the synthetic
/// request/summary pair.
pub fn compact(
    turns: &[Turn],
    summary: &str,
    total_pairs: usize,
    preserve_turns: usize,
) -> Compaction {
    let start = recent_window_start(turns, preserve_turns);
    let recent: Vec<Turn> = turns[start..]
        .iter()
        .filter(|t| !t.is_summary)
        .cloned()
        .collect();

    let history = project(&recent).with_summary(summary);
    let preserved = recent.len();

    let mut transcript = recent;
    transcript.push(Turn::summary(summary_label(total_pairs, summary)));

    Compaction {
        transcript,
        history,
        preserved,
    }
}
