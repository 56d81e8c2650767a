//! LLM provider abstraction
//!
//! Provides a common interface for streaming and one-shot generation.

mod error;
mod gemini;
mod sse;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use gemini::GeminiService;
pub use types::*;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;

/// Text deltas of a streamed reply, in arrival order
pub type ChunkStream = BoxStream<'static, Result<String, LlmError>>;

const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a non-streaming completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Open a streaming completion
    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Configuration for the inference provider
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub gemini_api_key: Option<String>,
    /// Gateway URL that injects credentials (e.g., `http://169.254.169.254/gateway/llm`)
    pub gateway: Option<String>,
    pub model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            gateway: std::env::var("LLM_GATEWAY").ok().filter(|g| !g.is_empty()),
            model: std::env::var("PARLOR_MODEL").ok().filter(|m| !m.is_empty()),
        }
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Build the logged service, or `None` when no credentials are configured
    pub fn build_service(&self) -> Result<Option<Arc<dyn LlmService>>, LlmError> {
        if self.gemini_api_key.is_none() && self.gateway.is_none() {
            return Ok(None);
        }
        let service = GeminiService::new(
            self.gemini_api_key.clone(),
            self.model(),
            self.gateway.as_deref(),
        )?;
        Ok(Some(Arc::new(LoggingService::new(Arc::new(service)))))
    }
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    total_tokens = response.usage.total(),
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
            }
        }

        result
    }

    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        let start = std::time::Instant::now();
        let stream = match self.inner.stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM stream failed to open"
                );
                return Err(e);
            }
        };

        tracing::debug!(
            model = %self.model_id,
            history_len = request.history.len(),
            "LLM stream opened"
        );

        let model_id = self.model_id.clone();
        Ok(stream
            .inspect(move |item| {
                if let Err(e) = item {
                    tracing::warn!(
                        model = %model_id,
                        elapsed_ms = %start.elapsed().as_millis(),
                        error = %e.message,
                        "LLM stream interrupted"
                    );
                }
            })
            .boxed())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
