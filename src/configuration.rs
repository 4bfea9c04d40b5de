use config::{Config, ConfigError, Environment as ConfigEnvironment, File};
use secrecy::Secret;
use serde_aux::field_attributes::deserialize_number_from_string;
use std::path::PathBuf;
use tracing::info;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub upstream: UpstreamSettings,
    #[serde(default)]
    pub history: HistorySettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
}

/// Upstream OpenAI-compatible completion API.
#[derive(serde::Deserialize, Clone)]
pub struct UpstreamSettings {
    #[serde(default = "default_api_key")]
    pub api_key: Secret<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

#[derive(serde::Deserialize, Clone)]
pub struct HistorySettings {
    #[serde(default = "default_history_dir")]
    pub dir: PathBuf,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            dir: default_history_dir(),
        }
    }
}

fn default_api_key() -> Secret<String> {
    Secret::new(String::new())
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4.1-2025-04-14".to_string()
}

fn default_max_context_chars() -> usize {
    300_000
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("chat_history")
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let base_path = std::env::current_dir()
        .expect("Failed to determine current directory")
        .join("configuration");

    let environment: AppEnvironment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse APP_ENVIRONMENT");

    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = Config::builder()
        .add_source(File::from(base_path.join("base.yaml")))
        .add_source(File::from(base_path.join(&environment_filename)).required(false))
        .add_source(
            ConfigEnvironment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let mut settings = settings.try_deserialize::<Settings>()?;

    // OPENAI_API_KEY always wins so the key never has to live in a yaml file.
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        settings.upstream.api_key = Secret::new(key);
    }

    info!("Configuration loaded ({})", environment.as_str());
    info!("  Host: {}", settings.application.host);
    info!("  Port: {}", settings.application.port);
    info!("  Upstream: {}", settings.upstream.base_url);
    info!("  Model: {}", settings.upstream.model);
    info!("  History dir: {}", settings.history.dir.display());

    Ok(settings)
}

pub enum AppEnvironment {
    Local,
    Production,
}

impl AppEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppEnvironment::Local => "local",
            AppEnvironment::Production => "production",
        }
    }
}

impl TryFrom<String> for AppEnvironment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}
