use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::server::{config::AppState, services::history::HistoryError};

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryPathResponse {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct SaveChatResponse {
    pub message: String,
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            detail: detail.into(),
        }),
    )
}

/// Create a new chat session and initialize its history file.
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let session_id = Uuid::new_v4().to_string();
    state.history.save(&session_id, &[]).map_err(|e| {
        error!("Failed to initialize session {} history: {:?}", session_id, e);
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Could not create chat session.",
        )
    })?;

    info!("New chat session created: {}", session_id);
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse { session_id }),
    ))
}

/// Absolute path of the chat history directory, for display.
pub async fn get_history_path(State(state): State<AppState>) -> Json<HistoryPathResponse> {
    let path = state.history.display_path();
    info!("Providing chat history path: {}", path);
    Json(HistoryPathResponse { path })
}

/// Copy the session's current history into a timestamped snapshot file.
pub async fn save_chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SaveChatResponse>, ApiError> {
    info!("Received request to save chat for session: {}", session_id);

    if Uuid::parse_str(&session_id).is_err() {
        warn!("Invalid session ID format for save request: {}", session_id);
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Invalid session ID format.",
        ));
    }

    match state.history.snapshot(&session_id) {
        Ok(filename) => Ok(Json(SaveChatResponse {
            message: "Chat history saved successfully.".to_string(),
            filename,
        })),
        Err(HistoryError::NotFound(_)) => {
            warn!(
                "Attempted to save non-existent chat history for session: {}",
                session_id
            );
            Err(api_error(
                StatusCode::NOT_FOUND,
                format!("No chat history found for session {}.", session_id),
            ))
        }
        Err(e) => {
            error!(
                "Error saving chat history for session {}: {:?}",
                session_id, e
            );
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to save chat history due to server I/O error.",
            ))
        }
    }
}
