//! Session controller: owns the session id, the channel, and the transcript
//! for one client instance, with explicit `start`, `teardown`, and `reset`
//! operations.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::client::channel::{open_channel, ChannelEvent, ChannelHandle, ChannelState};
use crate::client::transcript::ChatState;
use crate::protocol::{ClientEnvelope, ServerEnvelope};

/// Bounded wait for a stalled in-progress stream: if an assistant entry is
/// open and nothing arrives within this window, the controller surfaces a
/// local error and re-enables input. The channel itself is left open.
pub const STREAM_STALL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Could not create chat session (HTTP {0}).")]
    Bootstrap(u16),
    #[error("Failed to reach the chat server.")]
    Http(#[from] reqwest::Error),
    #[error("Not connected to the chat server.")]
    NotConnected,
    #[error("No active session.")]
    NoSession,
    #[error("Failed to send message. Please try again.")]
    SendFailed,
    #[error("{0}")]
    Server(String),
    #[error("failed to encode outbound envelope")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct HistoryPathResponse {
    path: String,
}

#[derive(Debug, Deserialize)]
struct SaveChatResponse {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

pub struct SessionController {
    http: reqwest::Client,
    base_url: String,
    session_id: Option<String>,
    chat: ChatState,
    channel: Option<ChannelHandle>,
    events: Option<mpsc::Receiver<ChannelEvent>>,
}

impl SessionController {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: None,
            chat: ChatState::new(),
            channel: None,
            events: None,
        }
    }

    pub fn chat(&self) -> &ChatState {
        &self.chat
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn channel_state(&self) -> Option<ChannelState> {
        self.channel.as_ref().map(|channel| channel.state())
    }

    /// Bootstrap a session and open its channel. A bootstrap failure is
    /// fatal to initialization: no channel is opened and no retry happens.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        let response = self
            .http
            .post(format!("{}/create_session", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SessionError::Bootstrap(response.status().as_u16()));
        }
        let created: CreateSessionResponse = response.json().await?;
        info!("Session created: {}", created.session_id);
        self.session_id = Some(created.session_id);
        self.open_channel()
    }

    fn open_channel(&mut self) -> Result<(), SessionError> {
        let session_id = self.session_id.as_ref().ok_or(SessionError::NoSession)?;
        let url = format!("{}/ws/{}", websocket_url(&self.base_url), session_id);
        let (handle, events) = open_channel(url);
        self.channel = Some(handle);
        self.events = Some(events);
        Ok(())
    }

    /// Close the channel with an intentional-shutdown code.
    pub async fn teardown(&mut self) {
        self.events = None;
        if let Some(channel) = self.channel.take() {
            channel.close().await;
        }
    }

    /// Tear down the current channel, then bootstrap a fresh session with an
    /// empty transcript.
    pub async fn reset(&mut self) -> Result<(), SessionError> {
        self.teardown().await;
        self.session_id = None;
        self.chat = ChatState::new();
        self.start().await
    }

    /// Outbound message composer. Returns `Ok(false)` for empty input (a
    /// no-op, not an error); never mutates the transcript unless the send
    /// succeeded.
    pub async fn send_message(&mut self, input: &str) -> Result<bool, SessionError> {
        let content = input.trim();
        if content.is_empty() {
            return Ok(false);
        }

        let channel = self.channel.as_ref().ok_or(SessionError::NotConnected)?;
        if channel.state() != ChannelState::Open {
            return Err(SessionError::NotConnected);
        }

        let frame = serde_json::to_string(&ClientEnvelope::chat_message(content))?;
        match channel.send(frame).await {
            Ok(()) => {
                self.chat.push_user(content);
                Ok(true)
            }
            Err(e) => {
                warn!("Send failed: {}", e);
                self.chat.input_enabled = true;
                Err(SessionError::SendFailed)
            }
        }
    }

    /// Wait for the next channel event. While a stream is in progress this
    /// applies the bounded stall wait and synthesizes a `StreamStalled`
    /// event instead of blocking forever.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        let events = self.events.as_mut()?;
        if self.chat.open_entry().is_some() {
            match tokio::time::timeout(STREAM_STALL_TIMEOUT, events.recv()).await {
                Ok(event) => event,
                Err(_) => {
                    warn!(
                        "Stream stalled: no envelope within {:?}",
                        STREAM_STALL_TIMEOUT
                    );
                    Some(ChannelEvent::StreamStalled)
                }
            }
        } else {
            events.recv().await
        }
    }

    /// Fold a channel event into the transcript state.
    pub fn apply_event(&mut self, event: &ChannelEvent) {
        match event {
            ChannelEvent::Envelope(envelope) => self.chat.apply(envelope),
            ChannelEvent::Open => {
                self.chat.input_enabled = true;
            }
            ChannelEvent::ParseError(detail) => {
                warn!("Discarding malformed frame: {}", detail);
                self.chat
                    .push_local_error("Received a malformed message from the server.");
            }
            ChannelEvent::StreamStalled => {
                self.chat
                    .push_local_error("The response stream stalled. You can try again.");
            }
            ChannelEvent::Closed { .. }
            | ChannelEvent::Reconnecting { .. }
            | ChannelEvent::Failed
            | ChannelEvent::Disconnected => {}
        }
    }

    pub async fn history_path(&self) -> Result<String, SessionError> {
        let response = self
            .http
            .get(format!("{}/get_history_path", self.base_url))
            .send()
            .await?;
        let body: HistoryPathResponse = response.json().await?;
        Ok(body.path)
    }

    /// Trigger a manual snapshot of the current session's history.
    pub async fn save_chat(&self) -> Result<String, SessionError> {
        let session_id = self.session_id.as_ref().ok_or(SessionError::NoSession)?;
        let response = self
            .http
            .post(format!("{}/save_chat/{}", self.base_url, session_id))
            .send()
            .await?;
        if response.status().is_success() {
            let body: SaveChatResponse = response.json().await?;
            Ok(body.filename)
        } else {
            let body: ErrorBody = response.json().await.unwrap_or(ErrorBody { detail: None });
            Err(SessionError::Server(
                body.detail
                    .unwrap_or_else(|| "Failed to save chat.".to_string()),
            ))
        }
    }

    /// Apply an envelope directly, bypassing the channel. Used by tests and
    /// by embedders that drive their own transport.
    pub fn apply_envelope(&mut self, envelope: &ServerEnvelope) {
        self.chat.apply(envelope);
    }
}

fn websocket_url(base_url: &str) -> String {
    if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        format!("ws://{}", base_url)
    }
}
