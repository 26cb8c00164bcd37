use super::filter::{apply_filter, bucket_counts, BucketCounts, ConversationFilter};
use super::notices::Notices;
use super::transcript::Transcript;
use crate::api::{Conversation, Message, TranscriptPayload};
use crate::shared::ConversationId;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    /// Lost, with the push worker backing off before the next attempt.
    Reconnecting,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Identifies one transcript load. A response is applied only if its
/// ticket is still the newest for the active conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub conversation_id: ConversationId,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub previous: Option<ConversationId>,
    pub ticket: LoadTicket,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TypingIndicator {
    conversation_id: ConversationId,
    agent: String,
    until: Instant,
}

/// All client state of the dashboard. Fields change only through the
/// transition methods below.
#[derive(Debug, Clone)]
pub struct DashboardState {
    agent_id: Option<String>,
    filter: ConversationFilter,
    conversations: Vec<Conversation>,
    counts: BucketCounts,
    list_loaded: bool,
    active: Option<ConversationId>,
    transcript: Option<Transcript>,
    generation: u64,
    ai_enabled: Option<bool>,
    connection: ConnectionStatus,
    typing: Option<TypingIndicator>,
    notices: Notices,
    login_error: Option<String>,
}

impl DashboardState {
    pub fn new(notice_ttl: Duration) -> Self {
        Self {
            agent_id: None,
            filter: ConversationFilter::default(),
            conversations: Vec::new(),
            counts: BucketCounts::default(),
            list_loaded: false,
            active: None,
            transcript: None,
            generation: 0,
            ai_enabled: None,
            connection: ConnectionStatus::Connecting,
            typing: None,
            notices: Notices::new(notice_ttl),
            login_error: None,
        }
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.agent_id.is_some()
    }

    pub fn filter(&self) -> &ConversationFilter {
        &self.filter
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn visible_conversations(&self) -> Vec<&Conversation> {
        apply_filter(&self.conversations, &self.filter, self.agent_id())
    }

    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|conversation| &conversation.id == id)
    }

    pub fn counts(&self) -> BucketCounts {
        self.counts
    }

    pub fn list_loaded(&self) -> bool {
        self.list_loaded
    }

    pub fn active(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn transcript(&self) -> Option<&Transcript> {
        self.transcript.as_ref()
    }

    pub fn ai_enabled(&self) -> Option<bool> {
        self.ai_enabled
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub fn notices_mut(&mut self) -> &mut Notices {
        &mut self.notices
    }

    pub fn login_error(&self) -> Option<&str> {
        self.login_error.as_deref()
    }

    pub fn typing_agent(&self, now: Instant) -> Option<&str> {
        let typing = self.typing.as_ref()?;
        if typing.until <= now || Some(&typing.conversation_id) != self.active.as_ref() {
            return None;
        }
        Some(typing.agent.as_str())
    }

    pub fn sign_in(&mut self, agent_id: String) {
        self.agent_id = Some(agent_id);
        self.login_error = None;
        self.counts = bucket_counts(&self.conversations, self.agent_id());
    }

    /// Drops everything tied to the agent. Returns the conversation whose
    /// room must be left.
    pub fn sign_out(&mut self) -> Option<ConversationId> {
        let previous = self.clear_active();
        self.agent_id = None;
        self.filter = ConversationFilter::default();
        self.conversations.clear();
        self.counts = BucketCounts::default();
        self.list_loaded = false;
        self.ai_enabled = None;
        self.typing = None;
        previous
    }

    pub fn set_login_error(&mut self, message: Option<String>) {
        self.login_error = message;
    }

    /// Returns the active conversation if the new filter hides it.
    pub fn set_filter(&mut self, filter: ConversationFilter) -> Option<ConversationId> {
        self.filter = filter;
        self.drop_active_if_hidden()
    }

    /// Replaces the cached list with a fresh fetch. Counts are derived from
    /// the same set. Returns the active conversation if it dropped out.
    pub fn apply_conversations(&mut self, conversations: Vec<Conversation>) -> Option<ConversationId> {
        self.conversations = conversations;
        self.counts = bucket_counts(&self.conversations, self.agent_id());
        self.list_loaded = true;
        self.drop_active_if_hidden()
    }

    /// Switches filter and list in one step, so the active conversation is
    /// judged against the new filter and the fresh list together.
    pub fn apply_conversations_with_filter(
        &mut self,
        filter: ConversationFilter,
        conversations: Vec<Conversation>,
    ) -> Option<ConversationId> {
        self.filter = filter;
        self.apply_conversations(conversations)
    }

    /// Patches the cached assignment until the next fetch replaces it.
    pub fn mark_assigned(&mut self, conversation_id: &ConversationId, agent: Option<String>) {
        if let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|conversation| &conversation.id == conversation_id)
        {
            conversation.needs_agent = conversation.needs_agent && agent.is_none();
            conversation.assigned_agent = agent;
        }
        self.counts = bucket_counts(&self.conversations, self.agent_id());
    }

    pub fn select(&mut self, conversation_id: ConversationId) -> Selection {
        let previous = self.active.take().filter(|previous| previous != &conversation_id);
        self.generation += 1;
        self.active = Some(conversation_id.clone());
        self.transcript = None;
        self.typing = None;
        Selection {
            previous,
            ticket: LoadTicket {
                conversation_id,
                generation: self.generation,
            },
        }
    }

    /// Ticket for reloading the active transcript in place.
    pub fn reload_ticket(&mut self) -> Option<LoadTicket> {
        let conversation_id = self.active.clone()?;
        self.generation += 1;
        Some(LoadTicket {
            conversation_id,
            generation: self.generation,
        })
    }

    pub fn apply_transcript(&mut self, ticket: &LoadTicket, payload: TranscriptPayload) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.transcript = Some(Transcript::from_history(
            ticket.conversation_id.clone(),
            payload,
        ));
        true
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.generation == self.generation && self.active.as_ref() == Some(&ticket.conversation_id)
    }

    pub fn deselect(&mut self) -> Option<ConversationId> {
        self.clear_active()
    }

    pub fn begin_send(&mut self, text: &str, now: DateTime<Utc>) -> Option<u64> {
        let agent = self.agent_id.as_deref();
        self.transcript
            .as_mut()
            .map(|transcript| transcript.push_pending(text, agent, now))
    }

    pub fn mark_sent(&mut self, local_id: u64) {
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.mark_sent(local_id);
        }
    }

    pub fn discard_pending(&mut self, local_id: u64) -> bool {
        self.transcript
            .as_mut()
            .is_some_and(|transcript| transcript.remove(local_id))
    }

    /// Updates the list preview and, only for the active conversation, the
    /// transcript. Returns whether the visible transcript changed.
    pub fn apply_incoming_message(&mut self, message: Message) -> bool {
        if let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|conversation| conversation.id == message.conversation_id)
        {
            conversation.latest_message_preview = message.text.clone();
        }
        if self.active.as_ref() != Some(&message.conversation_id) {
            return false;
        }
        if let Some(typing) = &self.typing {
            if typing.conversation_id == message.conversation_id {
                self.typing = None;
            }
        }
        match self.transcript.as_mut() {
            Some(transcript) => transcript.apply_incoming(message),
            None => false,
        }
    }

    pub fn has_unconfirmed_messages(&self) -> bool {
        self.transcript
            .as_ref()
            .is_some_and(Transcript::has_unconfirmed)
    }

    pub fn set_ai_enabled(&mut self, enabled: Option<bool>) {
        self.ai_enabled = enabled;
    }

    pub fn set_connection(&mut self, connection: ConnectionStatus) {
        self.connection = connection;
    }

    pub fn set_typing(&mut self, conversation_id: ConversationId, agent: String, until: Instant) {
        self.typing = Some(TypingIndicator {
            conversation_id,
            agent,
            until,
        });
    }

    fn drop_active_if_hidden(&mut self) -> Option<ConversationId> {
        if !self.list_loaded {
            return None;
        }
        let active = self.active.as_ref()?;
        let visible = self
            .conversation(active)
            .is_some_and(|conversation| self.filter.matches(conversation, self.agent_id()));
        if visible {
            return None;
        }
        self.clear_active()
    }

    fn clear_active(&mut self) -> Option<ConversationId> {
        self.generation += 1;
        self.transcript = None;
        self.typing = None;
        self.active.take()
    }
}
