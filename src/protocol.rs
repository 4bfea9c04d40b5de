//! Wire protocol shared by the relay server and the channel client.
//!
//! Every frame on the chat channel is a JSON object with a `type`
//! discriminator. Server-to-client envelopes carry streamed fragments,
//! complete messages, history replays, or error details; the client sends
//! `chat_message` envelopes back.

use serde::{Deserialize, Serialize};

/// Terminal marker ending a streamed response.
pub const STREAM_DONE: &str = "[DONE]";

/// One role-tagged message, as stored on disk and replayed over the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Server-to-client envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEnvelope {
    /// Partial or terminal content fragment of a streamed response.
    Stream {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    /// A complete role-tagged message.
    FullMessage { role: String, content: String },
    /// Ordered replay of prior messages; replaces the whole transcript.
    History {
        #[serde(default)]
        messages: Vec<ChatMessage>,
    },
    /// Server-side application error.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// Any tag this client does not know. Logged and ignored, never fatal.
    #[serde(other)]
    Unknown,
}

impl ServerEnvelope {
    pub fn stream(fragment: impl Into<String>) -> Self {
        ServerEnvelope::Stream {
            content: Some(fragment.into()),
        }
    }

    pub fn stream_done() -> Self {
        ServerEnvelope::Stream {
            content: Some(STREAM_DONE.to_string()),
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        ServerEnvelope::Error {
            detail: Some(detail.into()),
        }
    }
}

/// Client-to-server envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEnvelope {
    ChatMessage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl ClientEnvelope {
    pub fn chat_message(content: impl Into<String>) -> Self {
        ClientEnvelope::ChatMessage {
            content: Some(content.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_envelope_wire_format() {
        let json = serde_json::to_string(&ServerEnvelope::stream("Hi")).unwrap();
        assert_eq!(json, r#"{"type":"stream","content":"Hi"}"#);

        let json = serde_json::to_string(&ServerEnvelope::stream_done()).unwrap();
        assert_eq!(json, r#"{"type":"stream","content":"[DONE]"}"#);
    }

    #[test]
    fn full_message_and_history_round_trip() {
        let envelope: ServerEnvelope =
            serde_json::from_str(r#"{"type":"full_message","role":"assistant","content":"hello"}"#)
                .unwrap();
        assert_eq!(
            envelope,
            ServerEnvelope::FullMessage {
                role: "assistant".to_string(),
                content: "hello".to_string(),
            }
        );

        let envelope: ServerEnvelope =
            serde_json::from_str(r#"{"type":"history","messages":[{"role":"user","content":"hi"}]}"#)
                .unwrap();
        assert_eq!(
            envelope,
            ServerEnvelope::History {
                messages: vec![ChatMessage::user("hi")],
            }
        );

        // An absent message list decodes to the empty replay.
        let envelope: ServerEnvelope = serde_json::from_str(r#"{"type":"history"}"#).unwrap();
        assert_eq!(envelope, ServerEnvelope::History { messages: vec![] });
    }

    #[test]
    fn unknown_tags_decode_without_error() {
        let envelope: ServerEnvelope =
            serde_json::from_str(r#"{"type":"typing_indicator","user":"bob"}"#).unwrap();
        assert_eq!(envelope, ServerEnvelope::Unknown);

        let envelope: ClientEnvelope =
            serde_json::from_str(r#"{"type":"get_history"}"#).unwrap();
        assert_eq!(envelope, ClientEnvelope::Unknown);
    }

    #[test]
    fn chat_message_outbound_wire_format() {
        let json = serde_json::to_string(&ClientEnvelope::chat_message("hello")).unwrap();
        assert_eq!(json, r#"{"type":"chat_message","content":"hello"}"#);
    }
}
