use futures::StreamExt;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::types::{ChatRequest, OpenAiError, StreamResponse, StreamUpdate};

const SSE_DONE: &str = "[DONE]";

pub(super) async fn chat_stream(
    client: &Client,
    api_key: &Secret<String>,
    base_url: &str,
    request: ChatRequest,
) -> Result<mpsc::Receiver<StreamUpdate>, OpenAiError> {
    let url = format!("{}/chat/completions", base_url);
    let response = client
        .post(&url)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", api_key.expose_secret()))
        .json(&request)
        .send()
        .await
        .map_err(OpenAiError::Connect)?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(OpenAiError::RateLimited);
    }
    if !status.is_success() {
        return Err(OpenAiError::Status(status.as_u16()));
    }

    let (tx, rx) = mpsc::channel(100);
    tokio::spawn(async move {
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        'stream: while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    buffer.push_str(&String::from_utf8_lossy(&chunk));

                    // Process complete SSE lines
                    while let Some(pos) = buffer.find('\n') {
                        let line = buffer[..pos].trim().to_string();
                        buffer = buffer[pos + 1..].to_string();

                        if let Some(data) = line.strip_prefix("data: ") {
                            if data == SSE_DONE {
                                let _ = tx.send(StreamUpdate::Done).await;
                                break 'stream;
                            }

                            if let Ok(parsed) = serde_json::from_str::<StreamResponse>(data) {
                                if let Some(choice) = parsed.choices.first() {
                                    if let Some(content) = &choice.delta.content {
                                        debug!("delta: {} chars", content.len());
                                        if tx
                                            .send(StreamUpdate::Content(content.clone()))
                                            .await
                                            .is_err()
                                        {
                                            break 'stream;
                                        }
                                    }
                                    if choice.finish_reason.is_some() {
                                        let _ = tx.send(StreamUpdate::Done).await;
                                        break 'stream;
                                    }
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Upstream stream error: {}", e);
                    let _ = tx
                        .send(StreamUpdate::Error(
                            "An unexpected error occurred while communicating with the AI."
                                .to_string(),
                        ))
                        .await;
                    break;
                }
            }
        }
    });

    Ok(rx)
}
