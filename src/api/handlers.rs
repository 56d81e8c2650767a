//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    AcceptedResponse, ChatRequest, CreateSessionRequest, EditTurnRequest, ErrorResponse,
    SessionListResponse, SessionResponse, SessionWithTurnsResponse, SuccessResponse,
    SummarizeRequest,
};
use super::AppState;
use crate::db::DbError;
use crate::runtime::{DisplayEvent, RuntimeError};
use crate::state_machine::{Event, Session, SessionError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

const DEFAULT_TITLE: &str = "New chat";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session listing and creation
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/new", post(create_session))
        // Session retrieval
        .route("/api/sessions/:id", get(get_session))
        // SSE streaming
        .route("/api/sessions/:id/stream", get(stream_session))
        // User commands
        .route("/api/sessions/:id/chat", post(send_chat))
        .route("/api/sessions/:id/turns/:index/edit", post(edit_turn))
        .route("/api/sessions/:id/turns/:index/delete", post(delete_turn))
        .route("/api/sessions/:id/summarize", post(summarize))
        // Lifecycle
        .route("/api/sessions/:id/delete", post(delete_session))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Session Listing and Creation
// ============================================================

async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<SessionListResponse>, AppError> {
    let sessions = state.runtime.db().list_sessions()?;
    Ok(Json(SessionListResponse { sessions }))
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let id = uuid::Uuid::new_v4().to_string();
    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| req.character.name())
        .unwrap_or(DEFAULT_TITLE)
        .to_string();

    let (transcript, history) = req.character.seed();
    let session = state
        .runtime
        .db()
        .create_session(&id, &title, &req.character, &transcript, &history)?;

    tracing::info!(session_id = %id, turns = transcript.len(), "Created session");
    Ok(Json(SessionResponse { session }))
}

// ============================================================
// Session Retrieval
// ============================================================

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionWithTurnsResponse>, AppError> {
    let record = state.runtime.db().get_session(&id)?;
    let handle = state.runtime.get_or_create(&id).await?;
    let Session {
        transcript,
        summary,
        phase,
        ..
    } = handle.snapshot();

    Ok(Json(SessionWithTurnsResponse {
        session: record,
        turns: transcript.turns().to_vec(),
        summary,
        busy: phase.is_busy(),
    }))
}

// ============================================================
// SSE Streaming
// ============================================================

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = state.runtime.db().get_session(&id)?;
    let handle = state.runtime.get_or_create(&id).await?;

    // Subscribe before taking the snapshot so no event falls in between
    let broadcast_rx = handle.subscribe();
    let snapshot = handle.snapshot();

    let init_event = DisplayEvent::Init {
        session: serde_json::to_value(&record).unwrap_or(Value::Null),
        turns: snapshot.transcript.turns().to_vec(),
        summary: snapshot.summary.clone(),
        busy: snapshot.is_busy(),
    };

    Ok(sse_stream(init_event, broadcast_rx))
}

// ============================================================
// User Commands
// ============================================================

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<AcceptedResponse>, AppError> {
    state
        .runtime
        .submit(&id, Event::UserMessage { text: req.text })
        .await?;
    Ok(Json(AcceptedResponse { accepted: true }))
}

async fn edit_turn(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
    Json(req): Json<EditTurnRequest>,
) -> Result<Json<AcceptedResponse>, AppError> {
    state
        .runtime
        .submit(
            &id,
            Event::EditTurn {
                index,
                content: req.content,
            },
        )
        .await?;
    Ok(Json(AcceptedResponse { accepted: true }))
}

async fn delete_turn(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<AcceptedResponse>, AppError> {
    state
        .runtime
        .submit(&id, Event::DeleteTurn { index })
        .await?;
    Ok(Json(AcceptedResponse { accepted: true }))
}

async fn summarize(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SummarizeRequest>,
) -> Result<Json<AcceptedResponse>, AppError> {
    state
        .runtime
        .submit(&id, Event::SummaryRequested { turns: req.turns })
        .await?;
    Ok(Json(AcceptedResponse { accepted: true }))
}

// ============================================================
// Lifecycle
// ============================================================

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.runtime.db().delete_session(&id)?;
    state.runtime.remove(&id).await;
    tracing::info!(session_id = %id, "Deleted session");
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("parlor ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::SessionNotFound(_) => AppError::NotFound(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<RuntimeError> for AppError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::NotFound(_) => AppError::NotFound(e.to_string()),
            RuntimeError::Session(SessionError::Busy) => AppError::Conflict(e.to_string()),
            RuntimeError::Session(
                SessionError::TransportFailure(_) | SessionError::InvalidTransition(_),
            )
            | RuntimeError::Stopped
            | RuntimeError::Storage(_) => AppError::Internal(e.to_string()),
            RuntimeError::Session(_) => AppError::BadRequest(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
