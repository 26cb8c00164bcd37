use crate::shared::ConversationId;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Webchat,
    Whatsapp,
    Instagram,
    Unknown,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webchat => "webchat",
            Self::Whatsapp => "whatsapp",
            Self::Instagram => "instagram",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "webchat" | "web" | "widget" | "web_chat" => Some(Self::Webchat),
            "whatsapp" => Some(Self::Whatsapp),
            "instagram" | "ig" => Some(Self::Instagram),
            _ => None,
        }
    }

    pub fn from_wire(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Ai,
    Agent,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ai => "ai",
            Self::Agent => "agent",
        }
    }

    /// Backends label the assistant as `ai`, `bot` or `assistant`; anything
    /// that is not a guest or a human agent is treated as the AI.
    pub fn from_wire(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("user") | Some("guest") | Some("customer") => Self::User,
            Some("agent") | Some("human") => Self::Agent,
            _ => Self::Ai,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub username: String,
    pub channel: Channel,
    pub assigned_agent: Option<String>,
    pub needs_agent: bool,
    pub latest_message_preview: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub conversation_id: ConversationId,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Server-assigned message id, when the payload carries one.
    pub id: Option<String>,
    /// Human agent who wrote an `agent` message, when the payload names one.
    pub agent: Option<String>,
    /// False when `timestamp` is the local arrival time rather than the
    /// server's record time.
    pub server_time: bool,
}

impl Message {
    pub fn new(
        conversation_id: ConversationId,
        sender: Sender,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation_id,
            sender,
            text: text.into(),
            timestamp,
            id: None,
            agent: None,
            server_time: true,
        }
    }

    /// Whether both values describe the same stored message. Only a shared
    /// server id or an identical server timestamp counts; arrival times
    /// never do.
    pub fn is_same_record(&self, other: &Message) -> bool {
        if let (Some(left), Some(right)) = (&self.id, &other.id) {
            return left == right;
        }
        self.server_time
            && other.server_time
            && self.timestamp == other.timestamp
            && self.sender == other.sender
            && self.text == other.text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    Authenticated { agent_id: String },
    Unauthenticated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptPayload {
    pub username: String,
    pub channel: Option<Channel>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendReceipt {
    Accepted,
    Reply(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct StatusBody {
    #[serde(default, deserialize_with = "lenient_text")]
    pub(crate) message: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub(crate) error: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub(crate) status: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub(crate) reply: Option<String>,
    #[serde(default, deserialize_with = "lenient_optional_flag")]
    pub(crate) success: Option<bool>,
    #[serde(default)]
    pub(crate) agent: Option<WireAgent>,
    #[serde(default, deserialize_with = "lenient_optional_flag")]
    pub(crate) is_authenticated: Option<bool>,
    #[serde(default, deserialize_with = "lenient_optional_flag")]
    pub(crate) ai_enabled: Option<bool>,
}

impl StatusBody {
    pub(crate) fn message_text(&self) -> Option<String> {
        self.message
            .clone()
            .filter(|text| !text.trim().is_empty())
    }

    pub(crate) fn agent_id(&self) -> Option<String> {
        let agent = match self.agent.as_ref()? {
            WireAgent::Record { username, id } => username.clone().or_else(|| id.clone()),
            WireAgent::Name(name) => Some(name.clone()),
            WireAgent::Number(number) => Some(number.to_string()),
            WireAgent::Other(_) => None,
        };
        agent.filter(|agent| !agent.trim().is_empty())
    }
}

/// `agent` arrives as a bare name, a numeric id, or a user record.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireAgent {
    Name(String),
    Number(i64),
    Record {
        #[serde(default, deserialize_with = "lenient_text")]
        username: Option<String>,
        #[serde(default, deserialize_with = "lenient_text")]
        id: Option<String>,
    },
    Other(serde::de::IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConversationList {
    Bare(Vec<WireConversation>),
    Wrapped { conversations: Vec<WireConversation> },
}

#[derive(Debug, Deserialize)]
struct WireConversation {
    #[serde(default, alias = "convo_id")]
    conversation_id: Option<ConversationId>,
    #[serde(default)]
    id: Option<ConversationId>,
    #[serde(default, alias = "guest_name", alias = "name", deserialize_with = "lenient_text")]
    username: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    channel: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    assigned_agent: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    needs_agent: bool,
    #[serde(
        default,
        alias = "last_message",
        alias = "latest_message_preview",
        alias = "preview",
        deserialize_with = "lenient_text"
    )]
    latest_message: Option<String>,
    #[serde(default)]
    messages: Vec<WireMessage>,
}

impl WireConversation {
    fn into_conversation(self, received_at: DateTime<Utc>) -> Result<Conversation, String> {
        let id = self
            .conversation_id
            .or(self.id)
            .ok_or_else(|| "conversation is missing an id".to_string())?;
        let latest_message_preview = match self.latest_message {
            Some(preview) => preview,
            None => self
                .messages
                .into_iter()
                .map(|message| message.into_message(id.clone(), received_at))
                .max_by_key(|message| message.timestamp)
                .map(|message| message.text)
                .unwrap_or_default(),
        };
        Ok(Conversation {
            channel: Channel::from_wire(self.channel.as_deref()),
            username: self.username.unwrap_or_default(),
            assigned_agent: self.assigned_agent.filter(|agent| !agent.trim().is_empty()),
            needs_agent: self.needs_agent,
            latest_message_preview,
            id,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct TranscriptHeader {
    #[serde(default, deserialize_with = "lenient_text")]
    username: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    channel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTranscript {
    #[serde(default, deserialize_with = "lenient_text")]
    username: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    channel: Option<String>,
    #[serde(default)]
    conversation: Option<TranscriptHeader>,
    #[serde(default)]
    messages: Vec<WireMessage>,
}

/// Message record as stored by the backend. Shared by HTTP transcripts and
/// push payloads.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct WireMessage {
    #[serde(default, alias = "message_id", deserialize_with = "lenient_text")]
    pub(crate) id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub(crate) sender: Option<String>,
    #[serde(default, alias = "text", alias = "content", deserialize_with = "lenient_text")]
    pub(crate) message: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub(crate) agent: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub(crate) timestamp: Option<DateTime<Utc>>,
}

impl WireMessage {
    pub(crate) fn into_message(
        self,
        conversation_id: ConversationId,
        received_at: DateTime<Utc>,
    ) -> Message {
        Message {
            conversation_id,
            sender: Sender::from_wire(self.sender.as_deref()),
            text: self.message.unwrap_or_default(),
            server_time: self.timestamp.is_some(),
            timestamp: self.timestamp.unwrap_or(received_at),
            id: self.id.filter(|id| !id.trim().is_empty()),
            agent: self.agent.filter(|agent| !agent.trim().is_empty()),
        }
    }
}

pub(crate) fn decode_conversations(body: &Value) -> Result<Vec<Conversation>, String> {
    let list: ConversationList = serde_json::from_value(body.clone())
        .map_err(|_| "expected a conversation array or `conversations` object".to_string())?;
    let items = match list {
        ConversationList::Bare(items) | ConversationList::Wrapped { conversations: items } => items,
    };
    let received_at = Utc::now();
    items
        .into_iter()
        .map(|item| item.into_conversation(received_at))
        .collect()
}

pub(crate) fn decode_transcript(
    body: &Value,
    requested: &ConversationId,
) -> Result<TranscriptPayload, String> {
    let wire: WireTranscript =
        serde_json::from_value(body.clone()).map_err(|e| format!("invalid transcript: {e}"))?;
    let header = wire.conversation.unwrap_or_default();
    let received_at = Utc::now();
    Ok(TranscriptPayload {
        username: wire.username.or(header.username).unwrap_or_default(),
        channel: wire
            .channel
            .or(header.channel)
            .and_then(|raw| Channel::parse(&raw)),
        messages: wire
            .messages
            .into_iter()
            .map(|message| message.into_message(requested.clone(), received_at))
            .collect(),
    })
}

pub(crate) fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

pub(crate) fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_optional_flag(deserializer)?.unwrap_or(false))
}

pub(crate) fn lenient_optional_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .filter(|value| !value.is_null())
        .map(|value| lenient_bool(&value)))
}

pub(crate) fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_timestamp_value))
}

/// Flags arrive as booleans, integers, or the strings "1"/"0"/"true"/"false".
pub fn lenient_bool(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_i64().is_some_and(|n| n != 0),
        Value::String(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        _ => false,
    }
}

pub fn parse_timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => parse_timestamp(text),
        Value::Number(number) => {
            let seconds = number.as_f64()?;
            let millis = if seconds > 1e11 { seconds } else { seconds * 1000.0 };
            Utc.timestamp_millis_opt(millis as i64).single()
        }
        _ => None,
    }
}

/// Naive timestamps are taken as UTC, which is what the backend stores.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
