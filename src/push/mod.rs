use crate::api::types::{lenient_optional_flag, lenient_text, lenient_timestamp, WireMessage};
use crate::api::Message;
use crate::shared::ConversationId;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

pub mod codec;
pub mod socket;

pub use socket::{SocketIoChannel, SocketOptions};

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push connect failed: {0}")]
    Connect(String),
    #[error("push protocol error: {0}")]
    Protocol(String),
    #[error("push channel is closed")]
    Closed,
    #[error("push io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Event delivered by the push channel, including its connection lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Connected,
    /// Connection lost. `retrying` is false when the worker has given up.
    Disconnected {
        reason: String,
        retrying: bool,
    },
    Reconnected,
    NewMessage {
        message: Message,
        username: Option<String>,
    },
    Handoff {
        conversation_id: Option<ConversationId>,
        agent: Option<String>,
        user: Option<String>,
    },
    RefreshConversations,
    SettingsUpdated {
        ai_enabled: Option<bool>,
    },
    Typing {
        conversation_id: ConversationId,
        agent: Option<String>,
    },
    Error {
        conversation_id: Option<ConversationId>,
        message: String,
    },
    Unknown {
        name: String,
    },
}

/// Union of the fields carried by inbound event payloads.
#[derive(Debug, Default, Deserialize)]
struct PushPayload {
    #[serde(default, alias = "convo_id")]
    conversation_id: Option<ConversationId>,
    #[serde(default)]
    id: Option<ConversationId>,
    #[serde(default, deserialize_with = "lenient_text")]
    message_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    sender: Option<String>,
    #[serde(default, alias = "text", alias = "content", deserialize_with = "lenient_text")]
    message: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    error: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    agent: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    username: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    user: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_optional_flag")]
    ai_enabled: Option<bool>,
}

impl PushPayload {
    /// `id` names the conversation in push payloads; message ids travel as
    /// `message_id`.
    fn conversation(&self) -> Option<ConversationId> {
        self.conversation_id.clone().or_else(|| self.id.clone())
    }

    fn into_message(self, conversation_id: ConversationId, received_at: DateTime<Utc>) -> Message {
        let record = WireMessage {
            id: self.message_id,
            sender: self.sender,
            message: self.message,
            agent: self.agent,
            timestamp: self.timestamp,
        };
        record.into_message(conversation_id, received_at)
    }
}

impl PushEvent {
    pub fn from_socket_event(name: &str, data: &Value, received_at: DateTime<Utc>) -> Self {
        let payload: PushPayload = serde_json::from_value(data.clone()).unwrap_or_default();
        match name {
            "new_message" | "live_message" => match payload.conversation() {
                Some(conversation_id) => {
                    let username = payload.username.clone().or_else(|| payload.user.clone());
                    Self::NewMessage {
                        message: payload.into_message(conversation_id, received_at),
                        username,
                    }
                }
                None => Self::RefreshConversations,
            },
            "handoff" => Self::Handoff {
                conversation_id: payload.conversation(),
                user: payload.user.or(payload.username),
                agent: payload.agent,
            },
            "refresh_conversations" => Self::RefreshConversations,
            "settings_updated" => Self::SettingsUpdated {
                ai_enabled: payload.ai_enabled,
            },
            "typing" => match payload.conversation() {
                Some(conversation_id) => Self::Typing {
                    conversation_id,
                    agent: payload.agent,
                },
                None => Self::Unknown {
                    name: name.to_string(),
                },
            },
            "error" => Self::Error {
                conversation_id: payload.conversation(),
                message: payload
                    .message
                    .or(payload.error)
                    .or_else(|| data.as_str().map(str::to_string))
                    .unwrap_or_else(|| "push channel reported an error".to_string()),
            },
            other => Self::Unknown {
                name: other.to_string(),
            },
        }
    }

    /// Events after which the conversation list must be re-fetched.
    pub fn signals_list_change(&self) -> bool {
        matches!(
            self,
            Self::NewMessage { .. }
                | Self::Handoff { .. }
                | Self::RefreshConversations
                | Self::SettingsUpdated { .. }
                | Self::Reconnected
        )
    }
}

/// Message emitted to the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEmit {
    JoinConversation {
        conversation_id: ConversationId,
    },
    LeaveConversation {
        conversation_id: ConversationId,
    },
    AgentMessage {
        conversation_id: ConversationId,
        message: String,
        channel: String,
    },
    Typing {
        conversation_id: ConversationId,
        agent: String,
    },
}

impl PushEmit {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::JoinConversation { .. } => "join_conversation",
            Self::LeaveConversation { .. } => "leave_conversation",
            Self::AgentMessage { .. } => "agent_message",
            Self::Typing { .. } => "typing",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Self::JoinConversation { conversation_id }
            | Self::LeaveConversation { conversation_id } => {
                json!({"conversation_id": conversation_id})
            }
            Self::AgentMessage {
                conversation_id,
                message,
                channel,
            } => json!({
                "convo_id": conversation_id,
                "message": message,
                "channel": channel,
            }),
            Self::Typing {
                conversation_id,
                agent,
            } => json!({"conversation_id": conversation_id, "agent": agent}),
        }
    }

    pub fn encode(&self) -> String {
        codec::encode_event(self.event_name(), &self.payload())
    }
}

pub trait PushSink {
    fn emit(&mut self, emit: PushEmit) -> Result<(), PushError>;
}

pub trait PushChannel: PushSink {
    /// Next pending event, without blocking.
    fn poll_event(&mut self) -> Option<PushEvent>;
}

/// Sink for one-shot commands that never hold a live subscription.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflinePush;

impl PushSink for OfflinePush {
    fn emit(&mut self, _emit: PushEmit) -> Result<(), PushError> {
        Err(PushError::Closed)
    }
}

impl PushChannel for OfflinePush {
    fn poll_event(&mut self) -> Option<PushEvent> {
        None
    }
}
