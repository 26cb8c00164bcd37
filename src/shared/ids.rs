use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Backend conversation identifier.
///
/// Some backend routes hand out integer ids and others strings, so the id
/// remembers whether it arrived as a number and is sent back the same way.
/// Equality, ordering and hashing only look at the textual form.
#[derive(Debug, Clone)]
pub struct ConversationId {
    raw: String,
    numeric: bool,
}

impl ConversationId {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("conversation id must be non-empty".to_string());
        }
        if trimmed.chars().any(|ch| ch.is_control() || ch.is_whitespace()) {
            return Err("conversation id must not contain whitespace".to_string());
        }
        let numeric = trimmed.len() <= 19 && trimmed.chars().all(|ch| ch.is_ascii_digit());
        Ok(Self {
            raw: trimmed.to_string(),
            numeric,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        if self.numeric {
            if let Ok(value) = self.raw.parse::<u64>() {
                return serde_json::Value::from(value);
            }
        }
        serde_json::Value::String(self.raw.clone())
    }

    pub fn from_json_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(number) => Self::parse(&number.to_string()).ok(),
            serde_json::Value::String(text) => Self::parse(text).ok().map(|mut id| {
                id.numeric = false;
                id
            }),
            _ => None,
        }
    }
}

impl PartialEq for ConversationId {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for ConversationId {}

impl Hash for ConversationId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl PartialOrd for ConversationId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ConversationId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.raw.fmt(f)
    }
}

impl std::borrow::Borrow<str> for ConversationId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl Serialize for ConversationId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConversationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Self::from_json_value(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid conversation id `{value}`")))
    }
}
