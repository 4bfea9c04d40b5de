use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::protocol::ChatMessage;

const SAVED_CHATS_SUBDIR: &str = "saved_chats";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("No chat history found for session {0}.")]
    NotFound(String),
    #[error("history store I/O failure")]
    Io(#[from] std::io::Error),
    #[error("history serialization failure")]
    Serialize(#[from] serde_json::Error),
}

/// Per-session chat history persisted as JSON files, with a subdirectory of
/// manually saved snapshots.
pub struct ChatHistoryService {
    dir: PathBuf,
    saved_dir: PathBuf,
}

impl ChatHistoryService {
    /// Create the store, its snapshot subdirectory, and probe that the
    /// directory is writable so permission problems fail at startup.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let dir = dir.into();
        let saved_dir = dir.join(SAVED_CHATS_SUBDIR);
        fs::create_dir_all(&saved_dir)?;

        let probe = dir.join(format!(".write_test_{}", Uuid::new_v4()));
        fs::write(&probe, b"")?;
        fs::remove_file(&probe)?;

        info!("Chat history directory: {}", dir.display());
        Ok(Self { dir, saved_dir })
    }

    fn session_file(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }

    pub fn save(&self, session_id: &str, messages: &[ChatMessage]) -> Result<(), HistoryError> {
        let path = self.session_file(session_id);
        let json = serde_json::to_string_pretty(messages)?;
        fs::write(&path, json)?;
        debug!(
            "Saved {} messages for session {}",
            messages.len(),
            session_id
        );
        Ok(())
    }

    /// Load a session's history. A missing file is an empty history; a
    /// corrupt file is logged and treated as empty rather than crashing the
    /// connection.
    pub fn load(&self, session_id: &str) -> Vec<ChatMessage> {
        let path = self.session_file(session_id);
        if !path.exists() {
            warn!("No chat history found for session {}", session_id);
            return Vec::new();
        }
        match fs::read_to_string(&path)
            .map_err(HistoryError::from)
            .and_then(|raw| Ok(serde_json::from_str::<Vec<ChatMessage>>(&raw)?))
        {
            Ok(messages) => {
                debug!("Loaded chat history for session {}", session_id);
                messages
            }
            Err(e) => {
                error!(
                    "Invalid chat history file for session {}: {}",
                    session_id, e
                );
                Vec::new()
            }
        }
    }

    /// Copy the session's live history into a timestamped snapshot file and
    /// return the snapshot's filename.
    pub fn snapshot(&self, session_id: &str) -> Result<String, HistoryError> {
        let source = self.session_file(session_id);
        if !source.exists() {
            return Err(HistoryError::NotFound(session_id.to_string()));
        }

        fs::create_dir_all(&self.saved_dir)?;
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("session_{}_saved_{}.json", session_id, timestamp);
        fs::copy(&source, self.saved_dir.join(&filename))?;

        info!(
            "Saved chat history for session {} to {}/{}",
            session_id, SAVED_CHATS_SUBDIR, filename
        );
        Ok(filename)
    }

    /// Absolute history directory, for display only.
    pub fn display_path(&self) -> String {
        self.dir
            .canonicalize()
            .unwrap_or_else(|_| self.dir.clone())
            .display()
            .to_string()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
