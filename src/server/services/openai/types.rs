use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::ChatMessage;

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

// Streaming response types
#[derive(Debug, Deserialize)]
pub struct StreamResponse {
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
pub struct StreamChoice {
    pub delta: StreamDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamDelta {
    pub content: Option<String>,
}

/// One unit of a streamed completion, as consumed by the relay.
#[derive(Debug, Clone)]
pub enum StreamUpdate {
    Content(String),
    Done,
    Error(String),
}

/// Request-level upstream failures. The display strings are the details the
/// relay forwards to the client, so they must stay operator-meaningful.
#[derive(Debug, Error)]
pub enum OpenAiError {
    #[error("Could not connect to AI service.")]
    Connect(#[source] reqwest::Error),
    #[error("AI service is temporarily overloaded. Please try again later.")]
    RateLimited,
    #[error("AI service error (Status: {0}). Please try again.")]
    Status(u16),
}
