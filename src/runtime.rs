//! Runtime for executing sessions
//!
//! One task per live session applies commands and transport results in
//! arrival order. Handlers talk to it through a [`SessionHandle`].

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;
pub use traits::*;

/// Type alias for production runtime with concrete implementations
pub type ProductionRuntime = SessionRuntime<DatabaseStorage, ServiceLlmClient, BroadcastDisplay>;

use crate::db::{Database, DbError};
use crate::llm::LlmService;
use crate::state_machine::{Event, Session, SessionContext, SessionError, StatusKind};
use crate::transcript::Turn;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch, RwLock};

/// Errors surfaced by the runtime layer
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Session runtime stopped")]
    Stopped,
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<DbError> for RuntimeError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::SessionNotFound(id) => RuntimeError::NotFound(id),
            other => RuntimeError::Storage(other.to_string()),
        }
    }
}

/// An event plus, for user commands, where to report the outcome
pub struct Command {
    pub event: Event,
    pub reply: Option<oneshot::Sender<Result<(), SessionError>>>,
}

impl Command {
    /// Result of a background request; nobody waits for the outcome
    pub fn transport(event: Event) -> Self {
        Self { event, reply: None }
    }
}

/// Events sent to SSE clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayEvent {
    Init {
        session: serde_json::Value,
        turns: Vec<Turn>,
        summary: Option<String>,
        busy: bool,
    },
    Clear,
    Render {
        turns: Vec<Turn>,
    },
    Delta {
        text: String,
    },
    Status {
        kind: StatusKind,
        message: String,
    },
    Summary {
        text: String,
    },
    Busy {
        busy: bool,
    },
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<Command>,
    broadcast_tx: broadcast::Sender<DisplayEvent>,
    state_rx: watch::Receiver<Session>,
}

impl SessionHandle {
    /// Apply a user command and wait until its effects have been started
    pub async fn submit(&self, event: Event) -> Result<(), RuntimeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command {
                event,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| RuntimeError::Stopped)?;
        reply_rx.await.map_err(|_| RuntimeError::Stopped)??;
        Ok(())
    }

    /// Latest session state, including any in-flight optimistic turn
    pub fn snapshot(&self) -> Session {
        self.state_rx.borrow().clone()
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.state_rx.borrow().is_busy()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DisplayEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Watch state changes
    #[cfg(test)]
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.state_rx.clone()
    }
}

/// Manager for all session runtimes
pub struct RuntimeManager {
    db: Database,
    llm: Option<Arc<dyn LlmService>>,
    preserve_turns: usize,
    runtimes: RwLock<HashMap<String, SessionHandle>>,
}

impl RuntimeManager {
    pub fn new(db: Database, llm: Option<Arc<dyn LlmService>>, preserve_turns: usize) -> Self {
        Self {
            db,
            llm,
            preserve_turns,
            runtimes: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create a runtime for a session
    pub async fn get_or_create(&self, session_id: &str) -> Result<SessionHandle, RuntimeError> {
        // Check if already running
        {
            let runtimes = self.runtimes.read().await;
            if let Some(handle) = runtimes.get(session_id) {
                return Ok(handle.clone());
            }
        }

        let mut runtimes = self.runtimes.write().await;
        // Another request may have started it while we waited for the lock
        if let Some(handle) = runtimes.get(session_id) {
            return Ok(handle.clone());
        }

        let (record, transcript) = self.db.load_session(session_id)?;
        let context = SessionContext::new(&record.id, &record.character)
            .with_preserve_turns(self.preserve_turns);
        let session = Session::new(transcript, record.history, record.summary);

        let (command_tx, command_rx) = mpsc::channel(64);
        let (broadcast_tx, _) = broadcast::channel(256);
        let (state_tx, state_rx) = watch::channel(session.clone());

        let runtime: ProductionRuntime = SessionRuntime::new(
            context,
            session,
            DatabaseStorage::new(self.db.clone()),
            ServiceLlmClient::new(self.llm.clone()),
            BroadcastDisplay::new(broadcast_tx.clone()),
            command_rx,
            &command_tx,
            state_tx,
        );

        let id = session_id.to_string();
        tokio::spawn(async move {
            runtime.run().await;
            tracing::info!(session_id = %id, "Session runtime finished");
        });

        let handle = SessionHandle {
            command_tx,
            broadcast_tx,
            state_rx,
        };
        runtimes.insert(session_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Send a user command to a session
    pub async fn submit(&self, session_id: &str, event: Event) -> Result<(), RuntimeError> {
        let handle = self.get_or_create(session_id).await?;
        handle.submit(event).await
    }

    /// Stop tracking a session's runtime; it exits once in-flight work ends
    pub async fn remove(&self, session_id: &str) {
        self.runtimes.write().await.remove(session_id);
    }

    /// Get the database handle
    pub fn db(&self) -> &Database {
        &self.db
    }
}
