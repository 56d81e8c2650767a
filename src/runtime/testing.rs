//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use super::{DisplayEvent, SessionHandle, SessionRuntime};
use crate::character::CharacterProfile;
use crate::history::{project, TurnHistory};
use crate::llm::{ChunkStream, LlmError, LlmRequest, LlmResponse, Usage};
use crate::state_machine::{Event, Session, SessionContext, StatusKind};
use crate::transcript::{Transcript, Turn};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Scripted behaviour of one streaming request
pub enum StreamScript {
    /// Yield these items in order, then end
    Items(Vec<Result<String, LlmError>>),
    /// Fail before any chunk arrives
    OpenError(LlmError),
    /// Never yield anything
    Hang,
}

/// Mock LLM client that plays back queued scripts
pub struct MockLlmClient {
    streams: Mutex<VecDeque<StreamScript>>,
    completions: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(VecDeque::new()),
            completions: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a reply streamed as the given chunks
    pub fn queue_reply(&self, chunks: &[&str]) {
        let items = chunks.iter().map(|c| Ok((*c).to_string())).collect();
        self.streams
            .lock()
            .unwrap()
            .push_back(StreamScript::Items(items));
    }

    /// Queue a stream that yields `chunks` and then fails
    pub fn queue_broken_reply(&self, chunks: &[&str], error: LlmError) {
        let mut items: Vec<_> = chunks.iter().map(|c| Ok((*c).to_string())).collect();
        items.push(Err(error));
        self.streams
            .lock()
            .unwrap()
            .push_back(StreamScript::Items(items));
    }

    pub fn queue_stream(&self, script: StreamScript) {
        self.streams.lock().unwrap().push_back(script);
    }

    /// Queue a successful summary
    pub fn queue_summary(&self, text: &str) {
        self.completions.lock().unwrap().push_back(Ok(LlmResponse {
            text: text.to_string(),
            usage: Usage::default(),
        }));
    }

    pub fn queue_summary_error(&self, error: LlmError) {
        self.completions.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self.streams.lock().unwrap().pop_front();
        match script {
            Some(StreamScript::Items(items)) => Ok(futures::stream::iter(items).boxed()),
            Some(StreamScript::OpenError(e)) => Err(e),
            Some(StreamScript::Hang) => Ok(futures::stream::pending().boxed()),
            None => Err(LlmError::network("No mock stream queued")),
        }
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }
}

// ============================================================================
// In-Memory Storage
// ============================================================================

#[derive(Debug, Clone)]
pub struct SavedSession {
    pub transcript: Transcript,
    pub summary: Option<String>,
    pub history: TurnHistory,
}

/// In-memory session store
#[derive(Default)]
pub struct InMemoryStorage {
    sessions: Mutex<HashMap<String, SavedSession>>,
    saves: Mutex<usize>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<SavedSession> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl SessionStore for InMemoryStorage {
    async fn save_session(
        &self,
        session_id: &str,
        transcript: &Transcript,
        summary: Option<&str>,
        history: &TurnHistory,
    ) -> Result<(), String> {
        self.sessions.lock().unwrap().insert(
            session_id.to_string(),
            SavedSession {
                transcript: transcript.clone(),
                summary: summary.map(String::from),
                history: history.clone(),
            },
        );
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

// ============================================================================
// Recording Display
// ============================================================================

/// Display that records every call as a `DisplayEvent`
#[derive(Default)]
pub struct RecordingDisplay {
    events: Mutex<Vec<DisplayEvent>>,
}

impl RecordingDisplay {
    pub fn events(&self) -> Vec<DisplayEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn deltas(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DisplayEvent::Delta { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self, kind: StatusKind) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DisplayEvent::Status { kind: k, message } if k == kind => Some(message),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: DisplayEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl DisplaySink for RecordingDisplay {
    fn clear(&self) {
        self.push(DisplayEvent::Clear);
    }

    fn render(&self, turns: &[Turn]) {
        self.push(DisplayEvent::Render {
            turns: turns.to_vec(),
        });
    }

    fn render_streaming_delta(&self, text: &str) {
        self.push(DisplayEvent::Delta {
            text: text.to_string(),
        });
    }

    fn status(&self, kind: StatusKind, message: &str) {
        self.push(DisplayEvent::Status {
            kind,
            message: message.to_string(),
        });
    }

    fn summary_ready(&self, text: &str) {
        self.push(DisplayEvent::Summary {
            text: text.to_string(),
        });
    }

    fn busy_changed(&self, busy: bool) {
        self.push(DisplayEvent::Busy { busy });
    }
}

// ============================================================================
// Test Runtime Builder
// ============================================================================

/// Helper for building test runtimes with minimal boilerplate
pub struct TestRuntime {
    pub storage: Arc<InMemoryStorage>,
    pub llm: Arc<MockLlmClient>,
    pub display: Arc<RecordingDisplay>,
    pub handle: SessionHandle,
    _runtime_handle: tokio::task::JoinHandle<()>,
}

impl TestRuntime {
    pub fn builder() -> TestRuntimeBuilder {
        TestRuntimeBuilder::new()
    }

    /// Wait until no request is in flight
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.handle.watch();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|s| !s.is_busy())).await;
        matches!(waited, Ok(Ok(_)))
    }

    pub fn session(&self) -> Session {
        self.handle.snapshot()
    }

    pub async fn send_message(&self, text: &str) -> Result<(), super::RuntimeError> {
        self.handle
            .submit(Event::UserMessage {
                text: text.to_string(),
            })
            .await
    }
}

pub struct TestRuntimeBuilder {
    session_id: String,
    profile: CharacterProfile,
    turns: Vec<Turn>,
    preserve_turns: Option<usize>,
    llm: MockLlmClient,
}

impl TestRuntimeBuilder {
    pub fn new() -> Self {
        Self {
            session_id: "test-session".to_string(),
            profile: CharacterProfile::default(),
            turns: Vec::new(),
            preserve_turns: None,
            llm: MockLlmClient::new(),
        }
    }

    pub fn profile(mut self, profile: CharacterProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn turns(mut self, turns: Vec<Turn>) -> Self {
        self.turns = turns;
        self
    }

    pub fn preserve_turns(mut self, preserve_turns: usize) -> Self {
        self.preserve_turns = Some(preserve_turns);
        self
    }

    pub fn llm(mut self, llm: MockLlmClient) -> Self {
        self.llm = llm;
        self
    }

    pub fn build(self) -> TestRuntime {
        let storage = Arc::new(InMemoryStorage::new());
        let llm = Arc::new(self.llm);
        let display = Arc::new(RecordingDisplay::default());

        let mut context = SessionContext::new(&self.session_id, &self.profile);
        if let Some(preserve) = self.preserve_turns {
            context = context.with_preserve_turns(preserve);
        }

        let session = if self.turns.is_empty() {
            Session::seeded(&self.profile)
        } else {
            let transcript = Transcript::from_turns(self.turns);
            let history = project(transcript.turns());
            Session::new(transcript, history, None)
        };

        let (command_tx, command_rx) = mpsc::channel(32);
        let (broadcast_tx, _) = broadcast::channel(128);
        let (state_tx, state_rx) = watch::channel(session.clone());

        let runtime = SessionRuntime::new(
            context,
            session,
            storage.clone(),
            llm.clone(),
            display.clone(),
            command_rx,
            &command_tx,
            state_tx,
        );

        let join = tokio::spawn(async move {
            runtime.run().await;
        });

        TestRuntime {
            storage,
            llm,
            display,
            handle: SessionHandle {
                command_tx,
                broadcast_tx,
                state_rx,
            },
            _runtime_handle: join,
        }
    }
}

impl Default for TestRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::history::{HistoryEntry, SUMMARY_REQUEST};
    use crate::runtime::{RuntimeError, RuntimeManager};
    use crate::state_machine::SessionError;
    use crate::transcript::Role;

    const WAIT: Duration = Duration::from_secs(2);

    fn pairs(n: usize) -> Vec<Turn> {
        (0..n)
            .flat_map(|i| [Turn::user(format!("u{i}")), Turn::assistant(format!("a{i}"))])
            .collect()
    }

    #[tokio::test]
    async fn test_streamed_reply_commits() {
        let llm = MockLlmClient::new();
        llm.queue_reply(&["Hel", "lo"]);
        let rt = TestRuntime::builder().llm(llm).build();

        rt.send_message("hi").await.unwrap();
        assert!(rt.wait_idle(WAIT).await);

        let session = rt.session();
        assert_eq!(session.transcript.len(), 2);
        assert_eq!(session.transcript.get(1).unwrap().content, "Hello");
        assert_eq!(
            session.history.entries(),
            &[HistoryEntry::user("hi"), HistoryEntry::model("Hello")]
        );

        assert_eq!(rt.display.deltas(), vec!["Hel", "Hello"]);
        let saved = rt.storage.get("test-session").unwrap();
        assert_eq!(saved.transcript, session.transcript);
        assert_eq!(saved.history, session.history);

        let requests = rt.llm.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt, "hi");
        assert!(requests[0].history.is_empty());

        let busy: Vec<bool> = rt
            .display
            .events()
            .into_iter()
            .filter_map(|e| match e {
                DisplayEvent::Busy { busy } => Some(busy),
                _ => None,
            })
            .collect();
        assert_eq!(busy, vec![true, false]);
    }

    #[tokio::test]
    async fn test_prolog_session_sends_opening_cue() {
        let profile = CharacterProfile::default()
            .with("prolog", "The shop bell rings.")
            .with("start_situation", "closing time");
        let llm = MockLlmClient::new();
        llm.queue_reply(&["Welcome back."]);
        let rt = TestRuntime::builder().profile(profile.clone()).llm(llm).build();

        rt.send_message("Sorry, am I late?").await.unwrap();
        assert!(rt.wait_idle(WAIT).await);

        let request = &rt.llm.recorded_requests()[0];
        assert_eq!(
            request.history,
            vec![
                HistoryEntry::user("[Start situation: closing time]"),
                HistoryEntry::model("The shop bell rings."),
            ]
        );
        assert_eq!(request.system_prompt, profile.system_prompt());
    }

    #[tokio::test]
    async fn test_rollback_after_two_chunks() {
        let llm = MockLlmClient::new();
        llm.queue_broken_reply(&["par", "tial"], LlmError::network("connection reset"));
        let rt = TestRuntime::builder()
            .turns(vec![Turn::user("hi"), Turn::assistant("hello")])
            .llm(llm)
            .build();
        let before = rt.session();

        rt.send_message("next").await.unwrap();
        assert!(rt.wait_idle(WAIT).await);

        assert_eq!(rt.session(), before);
        assert_eq!(rt.storage.save_count(), 0);
        assert_eq!(rt.display.deltas(), vec!["par", "partial"]);
        let errors = rt.display.statuses(StatusKind::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("connection reset"));

        // The last render shows the restored transcript
        let last_render = rt
            .display
            .events()
            .into_iter()
            .rev()
            .find_map(|e| match e {
                DisplayEvent::Render { turns } => Some(turns),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_render.len(), 2);
    }

    #[tokio::test]
    async fn test_stream_open_failure_rolls_back() {
        let llm = MockLlmClient::new();
        llm.queue_stream(StreamScript::OpenError(LlmError::auth("bad key")));
        let rt = TestRuntime::builder().llm(llm).build();

        rt.send_message("hi").await.unwrap();
        assert!(rt.wait_idle(WAIT).await);

        assert!(rt.session().transcript.is_empty());
        assert!(rt.session().history.is_empty());
    }

    #[tokio::test]
    async fn test_commands_rejected_while_streaming() {
        let llm = MockLlmClient::new();
        llm.queue_stream(StreamScript::Hang);
        let rt = TestRuntime::builder()
            .turns(vec![Turn::user("hi"), Turn::assistant("hello")])
            .llm(llm)
            .build();

        rt.send_message("first").await.unwrap();
        assert!(rt.handle.is_busy());

        let err = rt.send_message("second").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Session(SessionError::Busy)));

        let err = rt
            .handle
            .submit(Event::DeleteTurn { index: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Session(SessionError::Busy)));

        // Optimistic user turn is visible while streaming
        assert_eq!(rt.session().transcript.len(), 3);
        assert_eq!(rt.llm.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_and_delete_through_handle() {
        let rt = TestRuntime::builder()
            .turns(vec![Turn::user("hi"), Turn::assistant("hello")])
            .build();

        rt.handle
            .submit(Event::EditTurn {
                index: 1,
                content: "hey there".into(),
            })
            .await
            .unwrap();
        assert_eq!(
            rt.session().history.entries(),
            &[HistoryEntry::user("hi"), HistoryEntry::model("hey there")]
        );

        let err = rt
            .handle
            .submit(Event::DeleteTurn { index: 5 })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Session(SessionError::IndexOutOfRange { index: 5, len: 2 })
        ));
        assert_eq!(rt.display.statuses(StatusKind::Error).len(), 1);

        rt.handle
            .submit(Event::DeleteTurn { index: 0 })
            .await
            .unwrap();
        let session = rt.session();
        assert_eq!(session.transcript.len(), 1);
        assert_eq!(session.transcript.get(0).unwrap().role, Role::Assistant);
        assert_eq!(session.history.len(), 2);
        assert_eq!(rt.storage.save_count(), 2);
    }

    #[tokio::test]
    async fn test_summary_compacts_and_persists() {
        let llm = MockLlmClient::new();
        llm.queue_summary("They met at the bookshop.");
        let rt = TestRuntime::builder()
            .turns(pairs(15))
            .preserve_turns(10)
            .llm(llm)
            .build();

        rt.handle
            .submit(Event::SummaryRequested { turns: 15 })
            .await
            .unwrap();
        assert!(rt.wait_idle(WAIT).await);

        let session = rt.session();
        assert_eq!(session.transcript.len(), 21);
        assert!(session.transcript.get(20).unwrap().is_summary);
        assert_eq!(session.summary.as_deref(), Some("They met at the bookshop."));
        assert_eq!(
            session.history.entries()[session.history.len() - 2],
            HistoryEntry::user(SUMMARY_REQUEST)
        );

        let saved = rt.storage.get("test-session").unwrap();
        assert_eq!(saved.summary.as_deref(), Some("They met at the bookshop."));
        assert!(rt
            .display
            .events()
            .iter()
            .any(|e| matches!(e, DisplayEvent::Summary { .. })));

        let request = &rt.llm.recorded_requests()[0];
        assert!(request.prompt.contains("User: u0"));
        assert!(request.prompt.contains("Character: a14"));
    }

    #[tokio::test]
    async fn test_summary_failure_leaves_session_untouched() {
        let llm = MockLlmClient::new();
        llm.queue_summary_error(LlmError::rate_limit("quota"));
        let rt = TestRuntime::builder().turns(pairs(3)).llm(llm).build();
        let before = rt.session();

        rt.handle
            .submit(Event::SummaryRequested { turns: 2 })
            .await
            .unwrap();
        assert!(rt.wait_idle(WAIT).await);

        assert_eq!(rt.session(), before);
        assert_eq!(rt.storage.save_count(), 0);
        assert_eq!(rt.display.statuses(StatusKind::Error).len(), 1);
    }

    #[tokio::test]
    async fn test_manager_without_llm_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let profile = CharacterProfile::default().with("prolog", "Hello there.");
        let (transcript, history) = profile.seed();
        db.create_session("s-1", "Test", &profile, &transcript, &history)
            .unwrap();

        let manager = RuntimeManager::new(db.clone(), None, 10);
        let handle = manager.get_or_create("s-1").await.unwrap();
        let mut rx = handle.watch();

        manager
            .submit(
                "s-1",
                Event::UserMessage {
                    text: "hi".into(),
                },
            )
            .await
            .unwrap();
        let idle = tokio::time::timeout(WAIT, rx.wait_for(|s| !s.is_busy())).await;
        assert!(matches!(idle, Ok(Ok(_))));

        assert_eq!(handle.snapshot().transcript.len(), 1);
        assert_eq!(db.get_turns("s-1").unwrap().len(), 1);

        assert!(matches!(
            manager.get_or_create("missing").await,
            Err(RuntimeError::NotFound(_))
        ));
    }
}
