use super::ConfigError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const MIN_POLL_INTERVAL_SECONDS: u64 = 5;
pub const MAX_POLL_INTERVAL_SECONDS: u64 = 10;
const KNOWN_CHANNELS: [&str; 3] = ["webchat", "whatsapp", "instagram"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SendTransport {
    #[default]
    Http,
    Push,
}

impl SendTransport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Push => "push",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    pub api_base: String,
    #[serde(default)]
    pub push_url: Option<String>,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_refresh_debounce_ms")]
    pub refresh_debounce_ms: u64,
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    #[serde(default = "default_inactivity_timeout_minutes")]
    pub inactivity_timeout_minutes: u64,
    #[serde(default = "default_notice_ttl_seconds")]
    pub notice_ttl_seconds: u64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub send_transport: SendTransport,
    #[serde(default = "default_channel")]
    pub default_channel: String,
}

fn default_poll_interval_seconds() -> u64 {
    MIN_POLL_INTERVAL_SECONDS
}

fn default_refresh_debounce_ms() -> u64 {
    750
}

fn default_reconnect_backoff_ms() -> u64 {
    1000
}

fn default_inactivity_timeout_minutes() -> u64 {
    30
}

fn default_notice_ttl_seconds() -> u64 {
    3
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_channel() -> String {
    "whatsapp".to_string()
}

impl Settings {
    pub fn for_api_base(api_base: &str) -> Self {
        Self {
            api_base: api_base.to_string(),
            push_url: None,
            poll_interval_seconds: default_poll_interval_seconds(),
            refresh_debounce_ms: default_refresh_debounce_ms(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            inactivity_timeout_minutes: default_inactivity_timeout_minutes(),
            notice_ttl_seconds: default_notice_ttl_seconds(),
            timezone: default_timezone(),
            send_transport: SendTransport::default(),
            default_channel: default_channel(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let api_base = self.api_base.trim();
        if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
            return Err(ConfigError::Settings(
                "`api_base` must be an http:// or https:// URL".to_string(),
            ));
        }
        if let Some(push_url) = &self.push_url {
            let push_url = push_url.trim();
            let valid = ["ws://", "wss://", "http://", "https://"]
                .iter()
                .any(|scheme| push_url.starts_with(scheme));
            if !valid {
                return Err(ConfigError::Settings(
                    "`push_url` must be a ws(s):// or http(s):// URL".to_string(),
                ));
            }
        }
        if !(MIN_POLL_INTERVAL_SECONDS..=MAX_POLL_INTERVAL_SECONDS)
            .contains(&self.poll_interval_seconds)
        {
            return Err(ConfigError::Settings(format!(
                "`poll_interval_seconds` must be between {MIN_POLL_INTERVAL_SECONDS} and {MAX_POLL_INTERVAL_SECONDS}"
            )));
        }
        for (key, value) in [
            ("refresh_debounce_ms", self.refresh_debounce_ms),
            ("reconnect_backoff_ms", self.reconnect_backoff_ms),
            ("inactivity_timeout_minutes", self.inactivity_timeout_minutes),
            ("notice_ttl_seconds", self.notice_ttl_seconds),
        ] {
            if value == 0 {
                return Err(ConfigError::Settings(format!("`{key}` must be > 0")));
            }
        }
        self.timezone()?;
        if !KNOWN_CHANNELS.contains(&self.default_channel.trim()) {
            return Err(ConfigError::Settings(format!(
                "`default_channel` must be one of: {}",
                KNOWN_CHANNELS.join(", ")
            )));
        }
        Ok(())
    }

    pub fn api_base(&self) -> &str {
        self.api_base.trim().trim_end_matches('/')
    }

    /// Push endpoint base. Falls back to the API base with its scheme
    /// switched to websocket.
    pub fn resolved_push_url(&self) -> String {
        let base = self
            .push_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.api_base())
            .trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        }
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone.trim().parse::<Tz>().map_err(|_| {
            ConfigError::Settings(format!("unknown `timezone` `{}`", self.timezone))
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn refresh_debounce(&self) -> Duration {
        Duration::from_millis(self.refresh_debounce_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_minutes * 60)
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_secs(self.notice_ttl_seconds)
    }
}
