//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use super::DisplayEvent;
use crate::db::Database;
use crate::history::TurnHistory;
use crate::llm::{ChunkStream, LlmError, LlmRequest, LlmResponse, LlmService};
use crate::state_machine::StatusKind;
use crate::transcript::{Transcript, Turn};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Storage for session state
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Replace the stored transcript, summary and history
    async fn save_session(
        &self,
        session_id: &str,
        transcript: &Transcript,
        summary: Option<&str>,
        history: &TurnHistory,
    ) -> Result<(), String>;
}

/// Client for making LLM requests
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Open a streaming completion
    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError>;

    /// Make a one-shot completion
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;
}

/// Where rendered output goes
pub trait DisplaySink: Send + Sync {
    fn clear(&self);
    fn render(&self, turns: &[Turn]);
    /// Partial reply accumulated so far
    fn render_streaming_delta(&self, text: &str);
    fn status(&self, kind: StatusKind, message: &str);
    fn summary_ready(&self, text: &str);
    fn busy_changed(&self, busy: bool);
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn save_session(
        &self,
        session_id: &str,
        transcript: &Transcript,
        summary: Option<&str>,
        history: &TurnHistory,
    ) -> Result<(), String> {
        (**self)
            .save_session(session_id, transcript, summary, history)
            .await
    }
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        (**self).stream(request).await
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        (**self).complete(request).await
    }
}

impl<T: DisplaySink + ?Sized> DisplaySink for Arc<T> {
    fn clear(&self) {
        (**self).clear();
    }

    fn render(&self, turns: &[Turn]) {
        (**self).render(turns);
    }

    fn render_streaming_delta(&self, text: &str) {
        (**self).render_streaming_delta(text);
    }

    fn status(&self, kind: StatusKind, message: &str) {
        (**self).status(kind, message);
    }

    fn summary_ready(&self, text: &str) {
        (**self).summary_ready(text);
    }

    fn busy_changed(&self, busy: bool) {
        (**self).busy_changed(busy);
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a `SessionStore`
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for DatabaseStorage {
    async fn save_session(
        &self,
        session_id: &str,
        transcript: &Transcript,
        summary: Option<&str>,
        history: &TurnHistory,
    ) -> Result<(), String> {
        self.db
            .save_session(session_id, transcript, summary, history)
            .map_err(|e| e.to_string())
    }
}

/// Adapter to use an optional `LlmService` as `LlmClient`
pub struct ServiceLlmClient {
    service: Option<Arc<dyn LlmService>>,
}

impl ServiceLlmClient {
    pub fn new(service: Option<Arc<dyn LlmService>>) -> Self {
        Self { service }
    }

    fn service(&self) -> Result<&Arc<dyn LlmService>, LlmError> {
        self.service
            .as_ref()
            .ok_or_else(|| LlmError::auth("No LLM configured. Set GEMINI_API_KEY or LLM_GATEWAY."))
    }
}

#[async_trait]
impl LlmClient for ServiceLlmClient {
    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        self.service()?.stream(request).await
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.service()?.complete(request).await
    }
}

/// Display that fans events out to SSE subscribers
#[derive(Clone)]
pub struct BroadcastDisplay {
    tx: broadcast::Sender<DisplayEvent>,
}

impl BroadcastDisplay {
    pub fn new(tx: broadcast::Sender<DisplayEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: DisplayEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

impl DisplaySink for BroadcastDisplay {
    fn clear(&self) {
        self.send(DisplayEvent::Clear);
    }

    fn render(&self, turns: &[Turn]) {
        self.send(DisplayEvent::Render {
            turns: turns.to_vec(),
        });
    }

    fn render_streaming_delta(&self, text: &str) {
        self.send(DisplayEvent::Delta {
            text: text.to_string(),
        });
    }

    fn status(&self, kind: StatusKind, message: &str) {
        self.send(DisplayEvent::Status {
            kind,
            message: message.to_string(),
        });
    }

    fn summary_ready(&self, text: &str) {
        self.send(DisplayEvent::Summary {
            text: text.to_string(),
        });
    }

    fn busy_changed(&self, busy: bool) {
        self.send(DisplayEvent::Busy { busy });
    }
}
