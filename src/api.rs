//! HTTP API for parlor
//!
//! Thin JSON and SSE surface over the session runtimes.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::db::Database;
use crate::llm::LlmService;
use crate::runtime::RuntimeManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeManager>,
}

impl AppState {
    pub fn new(db: Database, llm: Option<Arc<dyn LlmService>>, preserve_turns: usize) -> Self {
        Self {
            runtime: Arc::new(RuntimeManager::new(db, llm, preserve_turns)),
        }
    }
}
