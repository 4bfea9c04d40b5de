mod streaming;
mod types;

pub use types::*;

use chrono::Utc;
use reqwest::Client;
use secrecy::Secret;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::configuration::UpstreamSettings;
use crate::protocol::ChatMessage;

/// Client for an OpenAI-compatible streaming chat completion API.
#[derive(Debug, Clone)]
pub struct OpenAiService {
    client: Client,
    api_key: Secret<String>,
    base_url: String,
    model: String,
    max_context_chars: usize,
}

impl OpenAiService {
    pub fn new(settings: &UpstreamSettings) -> Self {
        Self {
            client: Client::new(),
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            max_context_chars: settings.max_context_chars,
        }
    }

    /// Start a streaming completion over the given history. The caller
    /// receives deltas over the channel; request-level failures are returned
    /// before any streaming begins.
    pub async fn chat_stream_with_history(
        &self,
        history: Vec<ChatMessage>,
    ) -> Result<mpsc::Receiver<StreamUpdate>, OpenAiError> {
        let system_prompt = self.system_prompt();
        let messages = trim_context(&system_prompt, history, self.max_context_chars);
        info!(
            "Sending upstream request (model: {}) with {} messages",
            self.model,
            messages.len()
        );
        streaming::chat_stream(&self.client, &self.api_key, &self.base_url, ChatRequest {
            model: self.model.clone(),
            messages,
            stream: true,
            temperature: 0.7,
            max_tokens: None,
        })
        .await
    }

    fn system_prompt(&self) -> String {
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        format!(
            "You are a helpful assistant. The current date and time is: {}.",
            now
        )
    }
}

/// Trim the conversation sent upstream to `max_chars` characters, dropping
/// the oldest conversational messages first. The system prompt is never
/// dropped, even when it alone exceeds the budget.
fn trim_context(
    system_prompt: &str,
    history: Vec<ChatMessage>,
    max_chars: usize,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(history);

    let mut current_chars: usize = messages.iter().map(|m| m.content.len()).sum();
    if current_chars <= max_chars {
        debug!("Context within limit: {} chars", current_chars);
        return messages;
    }

    let original_count = messages.len() - 1;
    while current_chars > max_chars && messages.len() > 1 {
        let removed = messages.remove(1);
        current_chars -= removed.content.len();
    }
    info!(
        "Context trimmed to {} chars: {} of {} messages remain",
        current_chars,
        messages.len() - 1,
        original_count
    );

    if messages.len() <= 1 && current_chars > max_chars {
        warn!(
            "System prompt alone exceeds the context limit ({} > {})",
            current_chars, max_chars
        );
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: &str, len: usize) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: "x".repeat(len),
        }
    }

    #[test]
    fn context_within_limit_is_untouched() {
        let history = vec![message("user", 10), message("assistant", 10)];
        let messages = trim_context("sys", history.clone(), 100);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert_eq!(&messages[1..], &history[..]);
    }

    #[test]
    fn oldest_messages_are_dropped_first() {
        let history = vec![
            message("user", 50),
            message("assistant", 50),
            message("user", 30),
        ];
        // Budget fits the system prompt plus only the two newest messages.
        let messages = trim_context("sys", history, 90);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content.len(), 50);
        assert_eq!(messages[2].content.len(), 30);
    }

    #[test]
    fn system_prompt_survives_even_when_over_budget() {
        let history = vec![message("user", 100)];
        let messages = trim_context(&"s".repeat(50), history, 10);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "system");
    }
}
