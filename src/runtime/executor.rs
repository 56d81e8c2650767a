//! Session runtime executor

use super::traits::{DisplaySink, LlmClient, SessionStore};
use super::Command;

use crate::llm::LlmRequest;
use crate::state_machine::{
    transition, Effect, Event, Session, SessionContext, SessionError, StatusKind,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Generic session runtime that can work with any storage, LLM and display
pub struct SessionRuntime<S, L, D>
where
    S: SessionStore + 'static,
    L: LlmClient + 'static,
    D: DisplaySink + 'static,
{
    context: SessionContext,
    session: Session,
    storage: S,
    llm_client: Arc<L>,
    display: D,
    command_rx: mpsc::Receiver<Command>,
    /// Weak so the loop ends once every handle is dropped and no request is
    /// in flight
    command_tx: mpsc::WeakSender<Command>,
    state_tx: watch::Sender<Session>,
}

impl<S, L, D> SessionRuntime<S, L, D>
where
    S: SessionStore + 'static,
    L: LlmClient + 'static,
    D: DisplaySink + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: SessionContext,
        session: Session,
        storage: S,
        llm_client: L,
        display: D,
        command_rx: mpsc::Receiver<Command>,
        command_tx: &mpsc::Sender<Command>,
        state_tx: watch::Sender<Session>,
    ) -> Self {
        Self {
            context,
            session,
            storage,
            llm_client: Arc::new(llm_client),
            display,
            command_rx,
            command_tx: command_tx.downgrade(),
            state_tx,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.context.session_id, "Starting session runtime");

        // Process commands one at a time
        while let Some(Command { event, reply }) = self.command_rx.recv().await {
            let is_transport = event.is_transport();
            let result = self.process_event(event).await;

            if let Err(e) = &result {
                if is_transport {
                    tracing::debug!(error = %e, "Dropping stale transport event");
                } else {
                    tracing::info!(error = %e, "Command rejected");
                }
            }
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        }

        tracing::info!(session_id = %self.context.session_id, "Session runtime stopped");
    }

    async fn process_event(&mut self, event: Event) -> Result<(), SessionError> {
        let is_transport = event.is_transport();

        // Pure state transition
        let result = match transition(&self.session, &self.context, event) {
            Ok(r) => r,
            Err(e) => {
                if !is_transport {
                    self.display.status(StatusKind::Error, &e.to_string());
                }
                return Err(e);
            }
        };

        let was_busy = self.session.is_busy();
        self.session = result.session;

        for effect in result.effects {
            self.execute_effect(effect).await;
        }

        if was_busy != self.session.is_busy() {
            self.display.busy_changed(self.session.is_busy());
        }
        self.state_tx.send_replace(self.session.clone());
        Ok(())
    }

    /// Execute an effect
    async fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::PersistSession => {
                if let Err(e) = self
                    .storage
                    .save_session(
                        &self.context.session_id,
                        &self.session.transcript,
                        self.session.summary.as_deref(),
                        &self.session.history,
                    )
                    .await
                {
                    tracing::error!(session_id = %self.context.session_id, error = %e, "Failed to persist session");
                    self.display
                        .status(StatusKind::Warning, &format!("Could not save the session: {e}"));
                }
            }

            Effect::RequestStream { request } => self.spawn_stream(request),

            Effect::RequestSummary { request } => self.spawn_summary(request),

            Effect::Render => {
                self.display.clear();
                self.display.render(self.session.transcript.turns());
            }

            Effect::RenderDelta { text } => self.display.render_streaming_delta(&text),

            Effect::NotifyStatus { kind, message } => self.display.status(kind, &message),

            Effect::StreamFinished { outcome } => {
                tracing::info!(
                    session_id = %self.context.session_id,
                    outcome = ?outcome,
                    turns = self.session.transcript.len(),
                    "Reply finished"
                );
            }

            Effect::ShowSummary { text } => self.display.summary_ready(&text),
        }
    }

    fn spawn_stream(&self, request: LlmRequest) {
        let Some(tx) = self.command_tx.upgrade() else {
            return;
        };
        let llm_client = self.llm_client.clone();

        tokio::spawn(async move {
            tracing::info!(history_len = request.history.len(), "Streaming reply (background)");

            let mut stream = match llm_client.stream(&request).await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = tx
                        .send(Command::transport(Event::StreamFailed { message: e.message }))
                        .await;
                    return;
                }
            };

            while let Some(item) = stream.next().await {
                let event = match item {
                    Ok(text) => Event::StreamChunk { text },
                    Err(e) => {
                        let _ = tx
                            .send(Command::transport(Event::StreamFailed { message: e.message }))
                            .await;
                        return;
                    }
                };
                if tx.send(Command::transport(event)).await.is_err() {
                    return;
                }
            }

            let _ = tx.send(Command::transport(Event::StreamComplete)).await;
        });
    }

    fn spawn_summary(&self, request: LlmRequest) {
        let Some(tx) = self.command_tx.upgrade() else {
            return;
        };
        let llm_client = self.llm_client.clone();

        tokio::spawn(async move {
            tracing::info!(prompt_len = request.prompt.len(), "Requesting summary (background)");

            let event = match llm_client.complete(&request).await {
                Ok(response) => Event::SummaryComplete {
                    text: response.text,
                },
                Err(e) => Event::SummaryFailed { message: e.message },
            };
            let _ = tx.send(Command::transport(event)).await;
        });
    }
}
