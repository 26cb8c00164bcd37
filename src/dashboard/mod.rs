use crate::api::{AuthStatus, Channel, Conversation, DeskApi, DeskError};
use crate::config::{ConfigError, SendTransport, Settings};
use crate::push::{PushEmit, PushEvent, PushSink};
use crate::session::SessionGate;
use crate::shared::{now_secs, ClientLog, ConversationId};
use chrono::Utc;
use chrono_tz::Tz;
use std::time::{Duration, Instant};

pub mod filter;
pub mod notices;
pub mod poll;
pub mod state;
pub mod transcript;
pub mod view;

pub use filter::{AssignmentFilter, BucketCounts, ConversationFilter};
pub use notices::{Notice, NoticeLevel, Notices};
pub use poll::{RefreshReason, RefreshScheduler};
pub use state::{ConnectionStatus, DashboardState, LoadTicket, Selection};
pub use transcript::{Delivery, Transcript, TranscriptLine};
pub use view::{render, DashboardPane, DashboardView, LoginView};

pub const TYPING_INDICATOR_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("message text is empty")]
    EmptyMessage,
    #[error("no conversation is open")]
    NoActiveConversation,
    #[error("not signed in")]
    NotAuthenticated,
    #[error("username and password are required")]
    MissingCredentials,
    #[error(transparent)]
    Api(#[from] DeskError),
}

impl DashboardError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DashboardOptions {
    pub send_transport: SendTransport,
    pub default_channel: String,
    pub timezone: Tz,
    pub notice_ttl: Duration,
}

impl DashboardOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            send_transport: settings.send_transport,
            default_channel: settings.default_channel.trim().to_string(),
            timezone: settings.timezone()?,
            notice_ttl: settings.notice_ttl(),
        })
    }
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            send_transport: SendTransport::Http,
            default_channel: "whatsapp".to_string(),
            timezone: chrono_tz::UTC,
            notice_ttl: Duration::from_secs(3),
        }
    }
}

/// The dashboard sync client: session gate, conversation list, active
/// transcript and handoff controls over one `DeskApi` and one push sink.
pub struct DashboardClient<A: DeskApi, P: PushSink> {
    api: A,
    push: P,
    session: SessionGate,
    state: DashboardState,
    options: DashboardOptions,
    log: ClientLog,
    refresh_requested: bool,
}

impl<A: DeskApi, P: PushSink> DashboardClient<A, P> {
    pub fn new(api: A, push: P, session: SessionGate, options: DashboardOptions, log: ClientLog) -> Self {
        let state = DashboardState::new(options.notice_ttl);
        Self {
            api,
            push,
            session,
            state,
            options,
            log,
            refresh_requested: false,
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut A {
        &mut self.api
    }

    pub fn push_mut(&mut self) -> &mut P {
        &mut self.push
    }

    pub fn session(&self) -> &SessionGate {
        &self.session
    }

    pub fn options(&self) -> &DashboardOptions {
        &self.options
    }

    pub fn render(&self, now: Instant) -> DashboardView {
        render(&self.state, now, Utc::now(), self.options.timezone)
    }

    /// Restores the persisted session and re-validates it with the server.
    pub fn restore_session(&mut self) -> AuthStatus {
        if let Some(agent_id) = self.session.restore(&mut self.api, now_secs()) {
            self.log
                .info("session.restored", &format!("re-validating session for {agent_id}"));
        }
        self.check_auth_status()
    }

    pub fn check_auth_status(&mut self) -> AuthStatus {
        let check = self.session.check_auth_status(&mut self.api, now_secs());
        match &check.status {
            AuthStatus::Authenticated { agent_id } => self.enter_dashboard(agent_id.clone()),
            AuthStatus::Unauthenticated => {
                self.leave_dashboard();
                if let Some(diagnostic) = check.diagnostic {
                    self.notify(NoticeLevel::Error, diagnostic);
                }
            }
        }
        check.status
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<String, DashboardError> {
        match self.session.login(&mut self.api, username, password, now_secs()) {
            Ok(agent_id) => {
                self.enter_dashboard(agent_id.clone());
                Ok(agent_id)
            }
            Err(err) => {
                let message = err.user_message();
                self.state.set_login_error(Some(message.clone()));
                self.notify(NoticeLevel::Error, message);
                Err(err)
            }
        }
    }

    pub fn logout(&mut self) -> Result<(), DashboardError> {
        self.leave_dashboard();
        let result = self.session.logout(&mut self.api);
        if let Err(err) = &result {
            self.notify(NoticeLevel::Error, err.user_message());
        }
        result
    }

    /// User-initiated list refresh under a new filter. Returns the visible
    /// subset of the fetched set.
    pub fn refresh_conversations(
        &mut self,
        filter: ConversationFilter,
    ) -> Result<Vec<Conversation>, DashboardError> {
        self.require_agent()?;
        self.touch();
        let dropped = self.state.set_filter(filter);
        self.leave_room(dropped);
        self.fetch_conversations(true)?;
        Ok(self
            .state
            .visible_conversations()
            .into_iter()
            .cloned()
            .collect())
    }

    /// Background poll. Failures are logged and retried on the next cycle.
    pub fn poll_conversations(&mut self) -> bool {
        if !self.state.is_signed_in() {
            return false;
        }
        self.fetch_conversations(false).is_ok()
    }

    pub fn select_conversation(&mut self, conversation_id: ConversationId) -> Result<(), DashboardError> {
        self.require_agent()?;
        self.touch();
        let selection = self.state.select(conversation_id.clone());
        self.leave_room(selection.previous);
        self.emit(PushEmit::JoinConversation {
            conversation_id: conversation_id.clone(),
        });
        match self.api.load_transcript(&conversation_id) {
            Ok(payload) => {
                self.state.apply_transcript(&selection.ticket, payload);
                Ok(())
            }
            Err(err) => {
                self.log.warn(
                    "transcript.load_failed",
                    &format!("conversation {conversation_id}: {err}"),
                );
                self.notify(NoticeLevel::Error, err.user_message());
                if self.state.is_current(&selection.ticket) {
                    let dropped = self.state.deselect();
                    self.leave_room(dropped);
                }
                Err(err.into())
            }
        }
    }

    pub fn deselect_conversation(&mut self) {
        let dropped = self.state.deselect();
        self.leave_room(dropped);
    }

    /// Appends the message optimistically, then sends it. On failure the
    /// transcript is reloaded from the server.
    pub fn send_message(&mut self, text: &str) -> Result<(), DashboardError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DashboardError::EmptyMessage);
        }
        self.require_agent()?;
        let conversation_id = self
            .state
            .active()
            .cloned()
            .ok_or(DashboardError::NoActiveConversation)?;
        let local_id = self
            .state
            .begin_send(text, Utc::now())
            .ok_or(DashboardError::NoActiveConversation)?;
        self.touch();

        let channel = self.channel_for(&conversation_id);
        let result = match self.options.send_transport {
            SendTransport::Http => self
                .api
                .send_message(&conversation_id, text, &channel)
                .map(|_| ()),
            SendTransport::Push => self
                .push
                .emit(PushEmit::AgentMessage {
                    conversation_id: conversation_id.clone(),
                    message: text.to_string(),
                    channel,
                })
                .map_err(|err| DeskError::Transport(err.to_string())),
        };

        match result {
            Ok(()) => {
                self.state.mark_sent(local_id);
                Ok(())
            }
            Err(err) => {
                self.log.warn(
                    "message.send_failed",
                    &format!("conversation {conversation_id}: {err}"),
                );
                self.notify(NoticeLevel::Error, err.user_message());
                if !self.reload_active_transcript() {
                    self.state.discard_pending(local_id);
                }
                Err(err.into())
            }
        }
    }

    pub fn notify_typing(&mut self) {
        let (Some(agent), Some(conversation_id)) = (
            self.state.agent_id().map(str::to_string),
            self.state.active().cloned(),
        ) else {
            return;
        };
        self.emit(PushEmit::Typing {
            conversation_id,
            agent,
        });
    }

    /// Assigns the conversation to this agent, then shows the "yours"
    /// bucket with a fresh list.
    pub fn take_over(&mut self, conversation_id: &ConversationId) -> Result<String, DashboardError> {
        let agent_id = self.require_agent()?;
        self.touch();
        let message = match self.api.take_over(conversation_id) {
            Ok(message) => message,
            Err(err) => return Err(self.action_failed("handoff.take_over_failed", conversation_id, err)),
        };
        self.log.info(
            "handoff.take_over",
            &format!("conversation {conversation_id} assigned to {agent_id}"),
        );
        self.notify(NoticeLevel::Info, message.clone());

        let yours = self.state.filter().with_assignment(AssignmentFilter::Yours);
        match self.api.list_conversations() {
            Ok(list) => {
                let dropped = self.state.apply_conversations_with_filter(yours, list);
                self.leave_room(dropped);
            }
            Err(err) => {
                self.log.warn("conversations.refresh_failed", &err.to_string());
                self.state.mark_assigned(conversation_id, Some(agent_id));
                let dropped = self.state.set_filter(yours);
                self.leave_room(dropped);
            }
        }
        Ok(message)
    }

    /// Returns the conversation to the AI; the transcript closes if it was
    /// open.
    pub fn hand_back_to_ai(&mut self, conversation_id: &ConversationId) -> Result<String, DashboardError> {
        self.require_agent()?;
        self.touch();
        let message = match self.api.hand_back(conversation_id) {
            Ok(message) => message,
            Err(err) => return Err(self.action_failed("handoff.hand_back_failed", conversation_id, err)),
        };
        self.log
            .info("handoff.hand_back", &format!("conversation {conversation_id} returned to ai"));
        if self.state.active() == Some(conversation_id) {
            self.deselect_conversation();
        }
        self.notify(NoticeLevel::Info, message.clone());
        self.state.mark_assigned(conversation_id, None);
        let _ = self.fetch_conversations(false);
        Ok(message)
    }

    /// Writes the global AI flag; the displayed value follows the server's
    /// answer and reverts if the write fails.
    pub fn set_global_ai_enabled(&mut self, enabled: bool) -> Result<bool, DashboardError> {
        self.require_agent()?;
        self.touch();
        let previous = self.state.ai_enabled();
        self.state.set_ai_enabled(Some(enabled));
        match self.api.set_ai_enabled(enabled) {
            Ok(confirmed) => {
                let value = confirmed.unwrap_or(enabled);
                self.state.set_ai_enabled(Some(value));
                self.log.info("settings.ai_enabled", &value.to_string());
                Ok(value)
            }
            Err(err) => {
                self.state.set_ai_enabled(previous);
                self.log.warn("settings.update_failed", &err.to_string());
                self.notify(NoticeLevel::Error, err.user_message());
                Err(err.into())
            }
        }
    }

    pub fn fetch_settings(&mut self) -> Result<bool, DashboardError> {
        self.require_agent()?;
        match self.api.fetch_settings() {
            Ok(enabled) => {
                self.state.set_ai_enabled(Some(enabled));
                Ok(enabled)
            }
            Err(err) => {
                self.log.warn("settings.fetch_failed", &err.to_string());
                Err(err.into())
            }
        }
    }

    pub fn handle_push_event(&mut self, event: PushEvent) {
        let lists_change = event.signals_list_change();
        match event {
            PushEvent::Connected => {
                self.state.set_connection(ConnectionStatus::Connected);
                self.rejoin_active();
            }
            PushEvent::Reconnected => {
                self.log.info("push.reconnected", "refreshing dashboard state");
                self.state.set_connection(ConnectionStatus::Connected);
                if self.state.is_signed_in() {
                    self.rejoin_active();
                    let _ = self.fetch_conversations(false);
                    self.reload_active_transcript();
                    let _ = self.fetch_settings();
                }
                return;
            }
            PushEvent::Disconnected { reason, retrying } => {
                self.log.warn("push.disconnected", &reason);
                self.state.set_connection(if retrying {
                    ConnectionStatus::Reconnecting
                } else {
                    ConnectionStatus::Disconnected
                });
            }
            PushEvent::NewMessage { message, .. } => {
                self.state.apply_incoming_message(message);
            }
            PushEvent::Handoff { agent, user, .. } => {
                let me = self.state.agent_id().map(str::to_string);
                if let Some(agent) = agent.filter(|agent| Some(agent) != me.as_ref()) {
                    let user = user.unwrap_or_else(|| "a guest".to_string());
                    self.notify(NoticeLevel::Info, format!("{agent} took over chat with {user}"));
                }
            }
            PushEvent::RefreshConversations => {}
            PushEvent::SettingsUpdated { ai_enabled } => {
                if let Some(enabled) = ai_enabled {
                    self.state.set_ai_enabled(Some(enabled));
                }
            }
            PushEvent::Typing {
                conversation_id,
                agent,
            } => {
                let agent = agent.unwrap_or_else(|| "another agent".to_string());
                let is_me = self.state.agent_id() == Some(agent.as_str());
                if !is_me && self.state.active() == Some(&conversation_id) {
                    self.state
                        .set_typing(conversation_id, agent, Instant::now() + TYPING_INDICATOR_TTL);
                }
            }
            PushEvent::Error {
                conversation_id,
                message,
            } => {
                self.log.warn("push.error", &message);
                if self.state.is_signed_in() {
                    self.notify(NoticeLevel::Error, message);
                }
                let affects_active =
                    conversation_id.is_none() || conversation_id.as_ref() == self.state.active();
                if affects_active && self.state.has_unconfirmed_messages() {
                    self.reload_active_transcript();
                }
            }
            PushEvent::Unknown { name } => {
                self.log.info("push.ignored", &format!("unhandled event `{name}`"));
            }
        }
        if lists_change && self.state.is_signed_in() {
            self.refresh_requested = true;
        }
    }

    /// Takes the pending push-triggered refresh request, if any.
    pub fn take_refresh_request(&mut self) -> bool {
        std::mem::take(&mut self.refresh_requested)
    }

    /// Ends the session after the configured idle time. Returns whether it
    /// expired.
    pub fn enforce_inactivity(&mut self, now_secs: i64) -> bool {
        if !self.session.is_expired(now_secs) {
            return false;
        }
        self.leave_dashboard();
        self.session.expire(&mut self.api);
        self.notify(NoticeLevel::Info, "Session expired after inactivity");
        true
    }

    pub fn expire_notices(&mut self, now: Instant) {
        self.state.notices_mut().expire(now);
    }

    pub fn dismiss_notice(&mut self, id: u64) -> bool {
        self.state.notices_mut().dismiss(id)
    }

    pub fn dismiss_latest_notice(&mut self) -> bool {
        self.state.notices_mut().dismiss_latest()
    }

    /// Records user activity for the inactivity timeout.
    pub fn touch(&mut self) {
        self.record_activity(now_secs());
    }

    pub fn record_activity(&mut self, now_secs: i64) {
        self.session.touch(&self.api, now_secs);
    }

    fn enter_dashboard(&mut self, agent_id: String) {
        self.state.sign_in(agent_id);
        let _ = self.fetch_conversations(true);
        let _ = self.fetch_settings();
        self.rejoin_active();
    }

    fn leave_dashboard(&mut self) {
        let dropped = self.state.sign_out();
        self.leave_room(dropped);
        self.refresh_requested = false;
    }

    fn fetch_conversations(&mut self, user_initiated: bool) -> Result<(), DeskError> {
        match self.api.list_conversations() {
            Ok(list) => {
                let dropped = self.state.apply_conversations(list);
                if let Some(dropped) = &dropped {
                    self.log.info(
                        "conversations.active_dropped",
                        &format!("conversation {dropped} left the current filter"),
                    );
                }
                self.leave_room(dropped);
                Ok(())
            }
            Err(err) => {
                self.log.warn("conversations.refresh_failed", &err.to_string());
                if user_initiated {
                    self.notify(NoticeLevel::Error, err.user_message());
                }
                Err(err)
            }
        }
    }

    fn reload_active_transcript(&mut self) -> bool {
        let Some(ticket) = self.state.reload_ticket() else {
            return false;
        };
        match self.api.load_transcript(&ticket.conversation_id) {
            Ok(payload) => self.state.apply_transcript(&ticket, payload),
            Err(err) => {
                self.log.warn(
                    "transcript.reload_failed",
                    &format!("conversation {}: {err}", ticket.conversation_id),
                );
                false
            }
        }
    }

    fn rejoin_active(&mut self) {
        if let Some(conversation_id) = self.state.active().cloned() {
            self.emit(PushEmit::JoinConversation { conversation_id });
        }
    }

    fn leave_room(&mut self, conversation_id: Option<ConversationId>) {
        if let Some(conversation_id) = conversation_id {
            self.emit(PushEmit::LeaveConversation { conversation_id });
        }
    }

    fn emit(&mut self, emit: PushEmit) {
        let name = emit.event_name();
        if let Err(err) = self.push.emit(emit) {
            self.log.info("push.emit_skipped", &format!("{name}: {err}"));
        }
    }

    fn notify(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.state.notices_mut().push(level, text, Instant::now());
    }

    fn action_failed(
        &mut self,
        event: &str,
        conversation_id: &ConversationId,
        err: DeskError,
    ) -> DashboardError {
        self.log
            .warn(event, &format!("conversation {conversation_id}: {err}"));
        self.notify(NoticeLevel::Error, err.user_message());
        err.into()
    }

    fn require_agent(&self) -> Result<String, DashboardError> {
        self.state
            .agent_id()
            .map(str::to_string)
            .ok_or(DashboardError::NotAuthenticated)
    }

    fn channel_for(&self, conversation_id: &ConversationId) -> String {
        let known = self
            .state
            .conversation(conversation_id)
            .map(|conversation| conversation.channel.clone())
            .filter(|channel| channel != &Channel::Unknown)
            .or_else(|| self.state.transcript().and_then(|t| t.channel().cloned()));
        match known {
            Some(channel) if channel != Channel::Unknown => channel.as_str().to_string(),
            _ => self.options.default_channel.clone(),
        }
    }
}
