use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn client_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/client.log")
}

pub fn append_client_log(state_root: &Path, level: &str, event: &str, message: &str) {
    let payload = serde_json::json!({
        "timestamp": super::now_secs(),
        "level": level,
        "event": event,
        "message": message,
    });

    let Ok(line) = serde_json::to_string(&payload) else {
        return;
    };

    let path = client_log_path(state_root);
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(path) else {
        return;
    };
    let _ = writeln!(file, "{line}");
}

/// Handle passed to the sync components so they can log without knowing
/// where the state root lives. A disabled log drops every line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientLog {
    state_root: Option<PathBuf>,
}

impl ClientLog {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: Some(state_root.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { state_root: None }
    }

    pub fn info(&self, event: &str, message: &str) {
        self.append("info", event, message);
    }

    pub fn warn(&self, event: &str, message: &str) {
        self.append("warn", event, message);
    }

    pub fn error(&self, event: &str, message: &str) {
        self.append("error", event, message);
    }

    fn append(&self, level: &str, event: &str, message: &str) {
        if let Some(root) = &self.state_root {
            append_client_log(root, level, event, message);
        }
    }
}
