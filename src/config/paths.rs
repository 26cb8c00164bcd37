use crate::config::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

pub const STATE_DIR: &str = ".frontdesk";
pub const SETTINGS_FILE_NAME: &str = "config.yaml";
pub const SESSION_FILE_NAME: &str = "session.json";
pub const CONFIG_PATH_ENV: &str = "FRONTDESK_CONFIG";

pub fn default_state_root() -> Result<PathBuf, ConfigError> {
    let home = std::env::var_os("HOME").ok_or(ConfigError::HomeDirectoryUnavailable)?;
    Ok(PathBuf::from(home).join(STATE_DIR))
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    Ok(default_state_root()?.join(SETTINGS_FILE_NAME))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub root: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn session_path(&self) -> PathBuf {
        self.root.join(SESSION_FILE_NAME)
    }

    pub fn log_path(&self) -> PathBuf {
        crate::shared::logging::client_log_path(&self.root)
    }

    pub fn bootstrap(&self) -> Result<(), ConfigError> {
        for dir in [self.root.clone(), self.root.join("logs")] {
            create_dir(&dir)?;
        }
        Ok(())
    }
}

fn create_dir(path: &Path) -> Result<(), ConfigError> {
    fs::create_dir_all(path).map_err(|source| ConfigError::CreateDir {
        path: path.display().to_string(),
        source,
    })
}
