//! Pure state transition function
//!
//! Every command is validated before anything is touched; a rejected command
//! leaves the session exactly as it was. Accepted commands produce a new
//! session value and the effects the runtime must carry out.

use super::{Effect, Event, Session, SessionContext, SessionPhase, StreamOutcome};
use crate::history::HistoryEntry;
use crate::llm::LlmRequest;
use crate::summary::{self, SummaryError, SUMMARY_MAX_TOKENS, SUMMARY_SYSTEM_PROMPT};
use crate::transcript::{TranscriptError, Turn};
use thiserror::Error;

/// Status shown when the model answers a summary request with nothing
const EMPTY_SUMMARY_STATUS: &str = "Summarization failed: the model returned an empty summary.";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub session: Session,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors a session command can fail with
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Choose between 1 and {max} turns to summarize (got {requested})")]
    InvalidRange { requested: usize, max: usize },
    #[error("Turn index {index} is out of range (transcript has {len} turns)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Message content cannot be empty")]
    EmptyContent,
    #[error("Request failed: {0}")]
    TransportFailure(String),
    #[error("There is not enough conversation to summarize")]
    EmptySession,
    #[error("Session is busy, wait for the current request to finish")]
    Busy,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl From<TranscriptError> for SessionError {
    fn from(e: TranscriptError) -> Self {
        match e {
            TranscriptError::IndexOutOfRange { index, len } => {
                SessionError::IndexOutOfRange { index, len }
            }
        }
    }
}

impl From<SummaryError> for SessionError {
    fn from(e: SummaryError) -> Self {
        match e {
            SummaryError::EmptySession => SessionError::EmptySession,
            SummaryError::InvalidRange { requested, max } => {
                SessionError::InvalidRange { requested, max }
            }
        }
    }
}

/// Pure transition function
#[allow(clippy::too_many_lines)]
pub fn transition(
    session: &Session,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, SessionError> {
    match (&session.phase, event) {
        // ============================================================
        // User commands (Idle only)
        // ============================================================
        (SessionPhase::Idle, Event::UserMessage { text }) => user_message(session, context, &text),

        (SessionPhase::Idle, Event::EditTurn { index, content }) => {
            let content = content.trim();
            if content.is_empty() {
                return Err(SessionError::EmptyContent);
            }
            let mut next = session.clone();
            next.transcript.update(index, content)?;
            next.reproject();
            Ok(TransitionResult::new(next)
                .with_effect(Effect::Render)
                .with_effect(Effect::PersistSession)
                .with_effect(Effect::success("Message updated.")))
        }

        (SessionPhase::Idle, Event::DeleteTurn { index }) => {
            let mut next = session.clone();
            next.transcript.remove_at(index)?;
            next.reproject();
            Ok(TransitionResult::new(next)
                .with_effect(Effect::Render)
                .with_effect(Effect::PersistSession)
                .with_effect(Effect::success("Message deleted.")))
        }

        (SessionPhase::Idle, Event::SummaryRequested { turns }) => {
            request_summary(session, context, turns)
        }

        (
            _,
            Event::UserMessage { .. }
            | Event::EditTurn { .. }
            | Event::DeleteTurn { .. }
            | Event::SummaryRequested { .. },
        ) => Err(SessionError::Busy),

        // ============================================================
        // Streaming reply
        // ============================================================
        (SessionPhase::Streaming { user_turn, accumulated }, Event::StreamChunk { text }) => {
            let mut accumulated = accumulated.clone();
            accumulated.push_str(&text);
            let mut next = session.clone();
            next.phase = SessionPhase::Streaming {
                user_turn: *user_turn,
                accumulated: accumulated.clone(),
            };
            Ok(TransitionResult::new(next).with_effect(Effect::RenderDelta { text: accumulated }))
        }

        (SessionPhase::Streaming { accumulated, .. }, Event::StreamComplete) => {
            let mut next = session.clone();
            next.transcript.append(Turn::assistant(accumulated.clone()));
            next.history.push(HistoryEntry::model(accumulated.clone()));
            next.phase = SessionPhase::Idle;
            Ok(TransitionResult::new(next)
                .with_effect(Effect::Render)
                .with_effect(Effect::PersistSession)
                .with_effect(Effect::StreamFinished {
                    outcome: StreamOutcome::Committed,
                }))
        }

        (SessionPhase::Streaming { user_turn, .. }, Event::StreamFailed { message }) => {
            // Undo the optimistic append; partial output is discarded
            let mut next = session.clone();
            next.transcript.remove_at(*user_turn)?;
            next.history.pop();
            next.phase = SessionPhase::Idle;
            Ok(TransitionResult::new(next)
                .with_effect(Effect::Render)
                .with_effect(Effect::error(
                    SessionError::TransportFailure(message).to_string(),
                ))
                .with_effect(Effect::StreamFinished {
                    outcome: StreamOutcome::RolledBack,
                }))
        }

        // ============================================================
        // Summarization
        // ============================================================
        (SessionPhase::Summarizing { total_pairs }, Event::SummaryComplete { text }) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(summary_failed(session, EMPTY_SUMMARY_STATUS.to_string()));
            }

            let compaction = summary::compact(
                session.transcript.turns(),
                text,
                *total_pairs,
                context.preserve_turns,
            );

            let mut next = session.clone();
            next.transcript.replace_all(compaction.transcript);
            next.history = compaction.history;
            next.summary = Some(text.to_string());
            next.phase = SessionPhase::Idle;

            Ok(TransitionResult::new(next)
                .with_effect(Effect::Render)
                .with_effect(Effect::PersistSession)
                .with_effect(Effect::success(format!(
                    "{total_pairs} turns summarized (latest {} turns kept verbatim).",
                    context.preserve_turns
                )))
                .with_effect(Effect::ShowSummary {
                    text: text.to_string(),
                }))
        }

        (SessionPhase::Summarizing { .. }, Event::SummaryFailed { message }) => {
            Ok(summary_failed(
                session,
                format!(
                    "Summarization failed: {}",
                    SessionError::TransportFailure(message)
                ),
            ))
        }

        // ============================================================
        // Stale or misrouted transport events
        // ============================================================
        (phase, event) => Err(SessionError::InvalidTransition(format!(
            "{event:?} while {}",
            phase.name()
        ))),
    }
}

fn user_message(
    session: &Session,
    context: &SessionContext,
    text: &str,
) -> Result<TransitionResult, SessionError> {
    let prompt = text.trim();
    if prompt.is_empty() {
        return Err(SessionError::EmptyContent);
    }

    let mut next = session.clone();
    // Context sent with the request excludes the prompt itself
    let prior = next.history.entries().to_vec();

    next.transcript.append(Turn::user(prompt));
    next.history.push(HistoryEntry::user(prompt));
    next.phase = SessionPhase::Streaming {
        user_turn: next.transcript.len() - 1,
        accumulated: String::new(),
    };

    let request = LlmRequest::new(context.system_prompt.clone(), prior, prompt);

    Ok(TransitionResult::new(next)
        .with_effect(Effect::Render)
        .with_effect(Effect::RequestStream { request }))
}

fn request_summary(
    session: &Session,
    context: &SessionContext,
    turns: usize,
) -> Result<TransitionResult, SessionError> {
    let total_pairs = summary::validate(session.transcript.len(), turns)?;

    let dialogue = summary::render_dialogue(session.transcript.turns(), &context.speakers);
    let prompt = summary::build_prompt(&dialogue, session.summary.as_deref());
    let request =
        LlmRequest::new(SUMMARY_SYSTEM_PROMPT, vec![], prompt).with_max_tokens(SUMMARY_MAX_TOKENS);

    let mut next = session.clone();
    next.phase = SessionPhase::Summarizing { total_pairs };

    Ok(TransitionResult::new(next)
        .with_effect(Effect::RequestSummary { request })
        .with_effect(Effect::info(format!("Summarizing {total_pairs} turns..."))))
}

/// Back to idle with nothing else touched
fn summary_failed(session: &Session, status: String) -> TransitionResult {
    let mut next = session.clone();
    next.phase = SessionPhase::Idle;
    TransitionResult::new(next).with_effect(Effect::error(status))
}
