//! Parlor - character chat backend
//!
//! Keeps a session transcript, projects it into model history, streams
//! replies and compacts long conversations into summaries.

mod api;
mod character;
mod db;
mod history;
mod llm;
mod runtime;
mod state_machine;
mod summary;
mod transcript;

use api::{create_router, AppState};
use db::Database;
use llm::LlmConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlor=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let db_path = std::env::var("PARLOR_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.parlor/parlor.db")
    });

    let port: u16 = std::env::var("PARLOR_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    let preserve_turns: usize = std::env::var("PARLOR_PRESERVE_TURNS")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(summary::DEFAULT_PRESERVE_TURNS);

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database
    tracing::info!(path = %db_path, "Opening database");
    let db = Database::open(&db_path)?;

    // Initialize LLM
    let llm_config = LlmConfig::from_env();
    let llm = llm_config.build_service()?;

    if llm.is_some() {
        tracing::info!(model = %llm_config.model(), "LLM initialized");
    } else {
        tracing::warn!("No LLM configured. Set GEMINI_API_KEY or LLM_GATEWAY.");
    }

    // Create application state
    let state = AppState::new(db, llm, preserve_turns);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new().gzip(true).br(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(preserve_turns, "Parlor server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
