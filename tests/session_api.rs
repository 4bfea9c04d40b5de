use secrecy::Secret;
use uuid::Uuid;

use chatstream::configuration::{
    ApplicationSettings, HistorySettings, Settings, UpstreamSettings,
};
use chatstream::server::config::configure_app;

async fn spawn_app(history_dir: std::path::PathBuf) -> String {
    let settings = Settings {
        application: ApplicationSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        upstream: UpstreamSettings {
            api_key: Secret::new("test_key".to_string()),
            // Never reached by these tests.
            base_url: "http://127.0.0.1:9".to_string(),
            model: "gpt-4.1-2025-04-14".to_string(),
            max_context_chars: 300_000,
        },
        history: HistorySettings { dir: history_dir },
    };
    let app = configure_app(&settings).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn create_session_returns_uuid_and_initializes_history() {
    let dir = tempfile::tempdir().unwrap();
    let history_dir = dir.path().join("chat_history");
    let base_url = spawn_app(history_dir.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/create_session", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let body: serde_json::Value = response.json().await.unwrap();
    let session_id = body["session_id"].as_str().unwrap();
    Uuid::parse_str(session_id).unwrap();

    // An empty history file exists immediately.
    let file = history_dir.join(format!("{}.json", session_id));
    let raw = std::fs::read_to_string(file).unwrap();
    let messages: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn history_path_points_at_the_store_directory() {
    let dir = tempfile::tempdir().unwrap();
    let history_dir = dir.path().join("chat_history");
    let base_url = spawn_app(history_dir.clone()).await;

    let response = reqwest::get(format!("{}/get_history_path", base_url))
        .await
        .unwrap();
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.unwrap();
    let path = body["path"].as_str().unwrap();
    assert!(path.ends_with("chat_history"));
}

#[tokio::test]
async fn save_chat_rejects_malformed_session_id() {
    let dir = tempfile::tempdir().unwrap();
    let base_url = spawn_app(dir.path().join("chat_history")).await;

    let response = reqwest::Client::new()
        .post(format!("{}/save_chat/not-a-uuid", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "Invalid session ID format.");
}

#[tokio::test]
async fn save_chat_of_unknown_session_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let base_url = spawn_app(dir.path().join("chat_history")).await;

    let response = reqwest::Client::new()
        .post(format!("{}/save_chat/{}", base_url, Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("No chat history"));
}

#[tokio::test]
async fn save_chat_snapshots_the_session_history() {
    let dir = tempfile::tempdir().unwrap();
    let history_dir = dir.path().join("chat_history");
    let base_url = spawn_app(history_dir.clone()).await;

    let client = reqwest::Client::new();
    let created: serde_json::Value = client
        .post(format!("{}/create_session", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let session_id = created["session_id"].as_str().unwrap();

    let response = client
        .post(format!("{}/save_chat/{}", base_url, session_id))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.unwrap();
    let filename = body["filename"].as_str().unwrap();
    assert!(filename.starts_with(&format!("session_{}_saved_", session_id)));
    assert!(history_dir.join("saved_chats").join(filename).exists());
    assert_eq!(body["message"], "Chat history saved successfully.");
}
