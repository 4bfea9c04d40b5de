use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::info;

use crate::configuration::Settings;
use crate::server::{
    handlers::session::{create_session, get_history_path, save_chat},
    services::{history::ChatHistoryService, openai::OpenAiService},
    ws::{transport::WebSocketState, ws_handler},
};

#[derive(Clone)]
pub struct AppState {
    pub history: Arc<ChatHistoryService>,
    pub openai: Arc<OpenAiService>,
    pub ws_state: Arc<WebSocketState>,
}

pub fn configure_app(settings: &Settings) -> Result<Router> {
    let history = Arc::new(ChatHistoryService::new(&settings.history.dir)?);
    let openai = Arc::new(OpenAiService::new(&settings.upstream));
    let ws_state = Arc::new(WebSocketState::new());

    let state = AppState {
        history,
        openai,
        ws_state,
    };

    Ok(app_router(state))
}

async fn log_request(request: Request, next: Next) -> Response {
    info!("{} {}", request.method(), request.uri().path());
    next.run(request).await
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route_service("/", ServeFile::new("static/index.html"))
        .route("/create_session", post(create_session))
        .route("/get_history_path", get(get_history_path))
        .route("/save_chat/:session_id", post(save_chat))
        .route("/ws/:session_id", get(ws_handler))
        .nest_service("/static", ServeDir::new("static"))
        .layer(middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
