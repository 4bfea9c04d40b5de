use std::{collections::HashMap, sync::Arc};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::protocol::ClientEnvelope;
use crate::server::{config::AppState, ws::handlers::chat::ChatHandler};

/// Active channel connections, keyed by session id.
#[derive(Clone, Default)]
pub struct WebSocketState {
    connections: Arc<RwLock<HashMap<String, mpsc::Sender<String>>>>,
}

impl WebSocketState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_connection(&self, session_id: String, tx: mpsc::Sender<String>) {
        let previous = self.connections.write().await.insert(session_id.clone(), tx);
        if previous.is_some() {
            // A new channel for a session supersedes any stale one.
            warn!("Replacing existing connection for session {}", session_id);
        }
    }

    pub async fn remove_connection(&self, session_id: &str) {
        self.connections.write().await.remove(session_id);
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

pub struct WebSocketTransport {
    pub state: Arc<WebSocketState>,
    pub app_state: AppState,
}

impl WebSocketTransport {
    pub fn new(state: Arc<WebSocketState>, app_state: AppState) -> Self {
        Self { state, app_state }
    }

    pub async fn handle_socket(
        &self,
        socket: WebSocket,
        session_id: String,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (sender, mut receiver) = socket.split();
        let (tx, mut rx) = mpsc::channel::<String>(32);

        self.state.add_connection(session_id.clone(), tx.clone()).await;
        info!(
            "Session {} connected ({} active)",
            session_id,
            self.state.connection_count().await
        );

        let mut chat_handler = ChatHandler::new(tx, self.app_state.clone(), session_id.clone());
        chat_handler.replay_history().await?;

        // Handle incoming frames
        let receive_handle = tokio::spawn(async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => {
                        debug!("Received frame: {}", text);
                        match serde_json::from_str::<ClientEnvelope>(&text) {
                            Ok(envelope) => {
                                if let Err(e) = chat_handler.handle_message(envelope).await {
                                    error!("Error handling chat message: {:?}", e);
                                }
                            }
                            Err(e) => {
                                warn!("Invalid frame from client: {}", e);
                                if chat_handler
                                    .send_error("Invalid message format.")
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                        }
                    }
                    Message::Close(_) => {
                        info!("Client disconnected");
                        break;
                    }
                    _ => {}
                }
            }
        });

        // Handle outgoing frames
        let send_handle = tokio::spawn(async move {
            let mut sender = sender;
            while let Some(msg) = rx.recv().await {
                if sender.send(Message::Text(msg)).await.is_err() {
                    break;
                }
            }
        });

        // Wait for either task to finish
        tokio::select! {
            _ = receive_handle => info!("Receive task completed"),
            _ = send_handle => info!("Send task completed"),
        }

        self.state.remove_connection(&session_id).await;

        Ok(())
    }
}
