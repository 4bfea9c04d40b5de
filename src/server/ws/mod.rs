use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::server::config::AppState;

pub mod handlers;
pub mod transport;

use transport::WebSocketTransport;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    info!("WebSocket upgrade request for session: {}", session_id);

    let valid_session = Uuid::parse_str(&session_id).is_ok();
    ws.on_upgrade(move |mut socket| async move {
        if !valid_session {
            warn!("Invalid session ID format received: {}", session_id);
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "invalid session id".into(),
                })))
                .await;
            return;
        }
        handle_socket(socket, state, session_id).await;
    })
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let transport = WebSocketTransport::new(state.ws_state.clone(), state);

    match transport.handle_socket(socket, session_id).await {
        Ok(_) => {
            info!("WebSocket connection closed normally");
        }
        Err(e) => {
            error!("WebSocket error: {:?}", e);
        }
    }
}
