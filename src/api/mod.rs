use crate::shared::ConversationId;

pub mod http;
pub mod types;

pub use http::HttpDeskApi;
pub use types::{
    AuthStatus, Channel, Conversation, Message, SendReceipt, Sender, TranscriptPayload,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeskError {
    #[error("desk api request failed: {0}")]
    Transport(String),
    #[error("desk api returned http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("not authorized: {message}")]
    Unauthorized { message: String },
    #[error("desk api reported an error: {0}")]
    Application(String),
    #[error("failed to decode desk api response: {0}")]
    Decode(String),
}

impl DeskError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Text shown to the agent: the server's own message when it sent one.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(reason) => format!("Network error: {reason}"),
            Self::Http { message, .. } => message.clone(),
            Self::Unauthorized { message } => message.clone(),
            Self::Application(message) => message.clone(),
            Self::Decode(reason) => format!("Unexpected server response: {reason}"),
        }
    }
}

/// HTTP JSON contract of the desk backend.
///
/// Implementations keep the session cookie themselves; `session_token`
/// exposes it so it can be persisted and restored across runs.
pub trait DeskApi {
    fn check_auth(&mut self) -> Result<AuthStatus, DeskError>;
    fn login(&mut self, username: &str, password: &str) -> Result<String, DeskError>;
    fn logout(&mut self) -> Result<(), DeskError>;
    /// Fetches every conversation visible to the agent. Filtering happens
    /// client-side so list and bucket counts share one fetch.
    fn list_conversations(&mut self) -> Result<Vec<Conversation>, DeskError>;
    fn load_transcript(&mut self, id: &ConversationId) -> Result<TranscriptPayload, DeskError>;
    fn send_message(
        &mut self,
        id: &ConversationId,
        text: &str,
        channel: &str,
    ) -> Result<SendReceipt, DeskError>;
    fn take_over(&mut self, id: &ConversationId) -> Result<String, DeskError>;
    fn hand_back(&mut self, id: &ConversationId) -> Result<String, DeskError>;
    fn fetch_settings(&mut self) -> Result<bool, DeskError>;
    /// Returns the flag the server reports after the write, if it reports one.
    fn set_ai_enabled(&mut self, enabled: bool) -> Result<Option<bool>, DeskError>;
    fn session_token(&self) -> Option<String>;
    fn restore_session_token(&mut self, token: Option<&str>);
}
