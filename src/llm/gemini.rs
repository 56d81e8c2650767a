//! Google Gemini provider implementation

use super::sse::SseParser;
use super::types::{LlmRequest, LlmResponse, Usage};
use super::{ChunkStream, LlmError, LlmService};
use crate::history::{HistoryEntry, HistoryRole};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Finish reasons that mean the reply was withheld
const BLOCKED_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

/// Gemini service implementation
pub struct GeminiService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model_id: String,
}

impl GeminiService {
    /// Direct API access with a key, or keyless access through a gateway
    pub fn new(
        api_key: Option<String>,
        model: &str,
        gateway: Option<&str>,
    ) -> Result<Self, LlmError> {
        let base_url = match gateway {
            Some(gw) => format!("{}/gemini/v1beta", gw.trim_end_matches('/')),
            None => DEFAULT_BASE_URL.to_string(),
        };

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url,
            model_id: model.to_string(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{method}", self.base_url, self.model_id)
    }

    async fn post(
        &self,
        url: &str,
        request: &LlmRequest,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, LlmError> {
        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&translate_request(request));
        if let Some(key) = &self.api_key {
            builder = builder.header("x-goog-api-key", key);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::network(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                LlmError::network(format!("Connection failed: {e}"))
            } else {
                LlmError::unknown(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
        let message = serde_json::from_str::<GeminiErrorResponse>(&body)
            .map_or(body, |resp| resp.error.message);
        Err(LlmError::from_status(status.as_u16(), &message))
    }
}

#[async_trait]
impl LlmService for GeminiService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = self.endpoint("generateContent");
        let response = self
            .post(&url, request, Some(Duration::from_secs(300)))
            .await?;

        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
        let frame: GeminiResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::unknown(format!("Failed to parse response: {e}")))?;

        let usage = frame.usage();
        let text = frame.into_text()?;
        Ok(LlmResponse { text, usage })
    }

    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        let response = self.post(&url, request, None).await?;
        Ok(decode_stream(Box::pin(response.bytes_stream())))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

fn translate_request(request: &LlmRequest) -> GeminiRequest {
    let system_instruction = if request.system_prompt.trim().is_empty() {
        None
    } else {
        Some(GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: request.system_prompt.clone(),
            }],
        })
    };

    let contents = request
        .contents()
        .into_iter()
        .map(GeminiContent::from)
        .collect();

    GeminiRequest {
        contents,
        system_instruction,
        generation_config: request.max_tokens.map(|max| GeminiGenerationConfig {
            max_output_tokens: max,
        }),
    }
}

struct DecodeState<S> {
    body: S,
    parser: SseParser,
    pending: VecDeque<Result<String, LlmError>>,
    finished: bool,
}

/// Turn a raw SSE byte stream into text deltas.
///
/// The stream ends after the first error item.
fn decode_stream<S, B, E>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        body,
        parser: SseParser::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                if item.is_err() {
                    st.pending.clear();
                    st.finished = true;
                }
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    let payloads = st.parser.feed(bytes.as_ref());
                    st.pending.extend(payloads.iter().filter_map(|p| decode_frame(p)));
                }
                Some(Err(e)) => {
                    st.finished = true;
                    st.pending
                        .push_back(Err(LlmError::network(format!("Stream interrupted: {e}"))));
                }
                None => {
                    st.finished = true;
                    if let Some(payload) = st.parser.finish() {
                        st.pending.extend(decode_frame(&payload));
                    }
                }
            }
        }
    })
    .boxed()
}

/// Text of one stream frame, or `None` when it carries no text
fn decode_frame(payload: &str) -> Option<Result<String, LlmError>> {
    let frame: GeminiResponse = match serde_json::from_str(payload) {
        Ok(frame) => frame,
        Err(e) => {
            return Some(Err(LlmError::unknown(format!(
                "Malformed stream frame: {e}"
            ))))
        }
    };
    match frame.into_text() {
        Ok(text) if text.is_empty() => None,
        other => Some(other),
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

impl From<HistoryEntry> for GeminiContent {
    fn from(entry: HistoryEntry) -> Self {
        let role = match entry.role {
            HistoryRole::User => "user",
            HistoryRole::Model => "model",
        };
        Self {
            role: Some(role.to_string()),
            parts: vec![GeminiPart { text: entry.text }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
}

/// Response body of `generateContent`, and of every `streamGenerateContent`
/// frame
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    usage_metadata: Option<GeminiUsageMetadata>,
    error: Option<GeminiError>,
}

impl GeminiResponse {
    fn usage(&self) -> Usage {
        self.usage_metadata
            .as_ref()
            .map(|u| Usage {
                input_tokens: u64::from(u.prompt_token_count),
                output_tokens: u64::from(u.candidates_token_count),
            })
            .unwrap_or_default()
    }

    /// Concatenated text of the first candidate
    fn into_text(self) -> Result<String, LlmError> {
        if let Some(error) = self.error {
            return Err(LlmError::from_status(error.code.unwrap_or(0), &error.message));
        }
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmError::blocked(format!("Prompt blocked: {reason}")));
        }

        let Some(candidate) = self.candidates.into_iter().next() else {
            return Ok(String::new());
        };
        let text: String = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect();

        match candidate.finish_reason.as_deref() {
            Some(reason) if text.is_empty() && BLOCKED_FINISH_REASONS.contains(&reason) => {
                Err(LlmError::blocked(format!("Response blocked: {reason}")))
            }
            _ => Ok(text),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContent,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
    code: Option<u16>,
}
