use crate::shared::fs_atomic::{atomic_write_file, remove_file_if_exists};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Agent identity kept between runs so a restart skips the login form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    pub agent_id: String,
    #[serde(default)]
    pub session_token: Option<String>,
    pub last_activity: i64,
}

fn io_error(path: &Path, source: std::io::Error) -> SessionError {
    SessionError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn json_error(path: &Path, source: serde_json::Error) -> SessionError {
    SessionError::Json {
        path: path.display().to_string(),
        source,
    }
}

pub fn load_session(path: &Path) -> Result<Option<SessionRecord>, SessionError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    let record: SessionRecord = serde_json::from_str(&raw).map_err(|e| json_error(path, e))?;
    if record.agent_id.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(record))
}

pub fn save_session(path: &Path, record: &SessionRecord) -> Result<(), SessionError> {
    let body = serde_json::to_vec_pretty(record).map_err(|e| json_error(path, e))?;
    atomic_write_file(path, &body).map_err(|e| io_error(path, e))
}

pub fn clear_session(path: &Path) -> Result<(), SessionError> {
    remove_file_if_exists(path)
        .map(|_| ())
        .map_err(|e| io_error(path, e))
}
