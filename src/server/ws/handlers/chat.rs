use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::protocol::{ChatMessage, ClientEnvelope, ServerEnvelope};
use crate::server::{config::AppState, services::openai::StreamUpdate};

type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Relays one connection's chat messages to the upstream model and streams
/// the response back as envelopes. Owns the in-memory copy of the session's
/// history for the lifetime of the connection.
pub struct ChatHandler {
    tx: mpsc::Sender<String>,
    state: AppState,
    session_id: String,
    messages: Vec<ChatMessage>,
}

impl ChatHandler {
    pub fn new(tx: mpsc::Sender<String>, state: AppState, session_id: String) -> Self {
        info!("Creating new ChatHandler for session: {}", session_id);
        let messages = state.history.load(&session_id);
        Self {
            tx,
            state,
            session_id,
            messages,
        }
    }

    /// Replay stored history to the client so a reconnect restores the
    /// transcript. An empty history replays as the empty list.
    pub async fn replay_history(&self) -> Result<(), HandlerError> {
        self.send(ServerEnvelope::History {
            messages: self.messages.clone(),
        })
        .await
    }

    pub async fn handle_message(&mut self, envelope: ClientEnvelope) -> Result<(), HandlerError> {
        match envelope {
            ClientEnvelope::ChatMessage {
                content: Some(content),
            } if !content.trim().is_empty() => self.relay(content).await,
            other => {
                debug!(
                    "Ignoring unhandled client envelope from session {}: {:?}",
                    self.session_id, other
                );
                Ok(())
            }
        }
    }

    async fn relay(&mut self, content: String) -> Result<(), HandlerError> {
        self.messages.push(ChatMessage::user(content));

        let mut updates = match self
            .state
            .openai
            .chat_stream_with_history(self.messages.clone())
            .await
        {
            Ok(updates) => updates,
            Err(e) => {
                error!(
                    "Failed to start upstream stream for session {}: {}",
                    self.session_id, e
                );
                self.send_error(&e.to_string()).await?;
                return Ok(());
            }
        };

        let mut assistant_content = String::new();
        let mut completed = false;
        let mut errored = false;

        while let Some(update) = updates.recv().await {
            match update {
                StreamUpdate::Content(chunk) => {
                    assistant_content.push_str(&chunk);
                    self.send(ServerEnvelope::stream(chunk)).await?;
                }
                StreamUpdate::Done => {
                    completed = true;
                    break;
                }
                StreamUpdate::Error(detail) => {
                    error!(
                        "Stream error for session {}: {}",
                        self.session_id, detail
                    );
                    self.send_error(&detail).await?;
                    errored = true;
                    break;
                }
            }
        }

        // Persist whatever the model produced, even after a mid-stream
        // error, so the history is durable before the client sees the
        // terminal sentinel.
        if !assistant_content.is_empty() {
            self.messages.push(ChatMessage::assistant(assistant_content));
            self.state.history.save(&self.session_id, &self.messages)?;
        } else if !errored {
            warn!("Upstream response was empty for session {}", self.session_id);
        }

        if completed {
            self.send(ServerEnvelope::stream_done()).await?;
            info!(
                "Successfully streamed response for session {}",
                self.session_id
            );
        }

        Ok(())
    }

    pub async fn send_error(&self, detail: &str) -> Result<(), HandlerError> {
        self.send(ServerEnvelope::error(detail)).await
    }

    async fn send(&self, envelope: ServerEnvelope) -> Result<(), HandlerError> {
        let msg = serde_json::to_string(&envelope)?;
        self.tx.send(msg).await.map_err(|e| {
            warn!("Client gone before envelope could be sent: {}", e);
            format!("Failed to send envelope: {}", e)
        })?;
        Ok(())
    }
}
