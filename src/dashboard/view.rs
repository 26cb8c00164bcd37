use super::filter::{AssignmentFilter, BucketCounts};
use super::notices::NoticeLevel;
use super::state::{ConnectionStatus, DashboardState};
use super::transcript::{Delivery, TranscriptLine};
use crate::api::{Channel, Sender};
use crate::shared::ConversationId;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::time::Instant;

const PREVIEW_CHARS: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardView {
    Login(LoginView),
    Dashboard(DashboardPane),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginView {
    pub error: Option<String>,
    pub notices: Vec<NoticeView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardPane {
    pub agent_id: String,
    pub filter: AssignmentFilter,
    pub channel: Option<Channel>,
    pub counts: BucketCounts,
    pub loading: bool,
    pub rows: Vec<ConversationRow>,
    pub transcript: Option<TranscriptPane>,
    pub ai_enabled: Option<bool>,
    pub connection: ConnectionStatus,
    pub notices: Vec<NoticeView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRow {
    pub id: ConversationId,
    pub username: String,
    pub channel: Channel,
    pub preview: String,
    pub needs_agent: bool,
    pub assigned_agent: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptPane {
    pub conversation_id: ConversationId,
    pub username: String,
    pub channel: Option<Channel>,
    pub loading: bool,
    pub lines: Vec<TranscriptLine>,
    pub typing: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeView {
    pub id: u64,
    pub level: NoticeLevel,
    pub text: String,
}

/// Derives the whole view from state. Called after every transition.
pub fn render(state: &DashboardState, now: Instant, wall_now: DateTime<Utc>, tz: Tz) -> DashboardView {
    let notices = state
        .notices()
        .active(now)
        .into_iter()
        .map(|notice| NoticeView {
            id: notice.id,
            level: notice.level,
            text: notice.text.clone(),
        })
        .collect();

    let Some(agent_id) = state.agent_id() else {
        return DashboardView::Login(LoginView {
            error: state.login_error().map(str::to_string),
            notices,
        });
    };

    let active = state.active();
    let rows = state
        .visible_conversations()
        .into_iter()
        .map(|conversation| ConversationRow {
            id: conversation.id.clone(),
            username: conversation.username.clone(),
            channel: conversation.channel.clone(),
            preview: truncate_preview(&conversation.latest_message_preview),
            needs_agent: conversation.needs_agent,
            assigned_agent: conversation.assigned_agent.clone(),
            active: Some(&conversation.id) == active,
        })
        .collect();

    let today = wall_now.with_timezone(&tz).date_naive();
    let transcript = active.map(|conversation_id| {
        let listed = state.conversation(conversation_id);
        match state.transcript() {
            Some(transcript) => TranscriptPane {
                conversation_id: conversation_id.clone(),
                username: non_empty(transcript.username())
                    .or_else(|| listed.map(|c| c.username.clone()))
                    .unwrap_or_default(),
                channel: transcript
                    .channel()
                    .cloned()
                    .or_else(|| listed.map(|c| c.channel.clone())),
                loading: false,
                lines: transcript.lines(tz, today),
                typing: state.typing_agent(now).map(str::to_string),
            },
            None => TranscriptPane {
                conversation_id: conversation_id.clone(),
                username: listed.map(|c| c.username.clone()).unwrap_or_default(),
                channel: listed.map(|c| c.channel.clone()),
                loading: true,
                lines: Vec::new(),
                typing: None,
            },
        }
    });

    DashboardView::Dashboard(DashboardPane {
        agent_id: agent_id.to_string(),
        filter: state.filter().assignment,
        channel: state.filter().channel.clone(),
        counts: state.counts(),
        loading: !state.list_loaded(),
        rows,
        transcript,
        ai_enabled: state.ai_enabled(),
        connection: state.connection(),
        notices,
    })
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn truncate_preview(text: &str) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= PREVIEW_CHARS {
        return single_line;
    }
    let mut preview: String = single_line.chars().take(PREVIEW_CHARS - 1).collect();
    preview.push('…');
    preview
}

pub fn sender_label(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "guest",
        Sender::Ai => "ai",
        Sender::Agent => "agent",
    }
}

impl fmt::Display for TranscriptPane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channel = self
            .channel
            .as_ref()
            .map(Channel::as_str)
            .unwrap_or("unknown");
        writeln!(f, "conversation={}", self.conversation_id)?;
        writeln!(f, "guest={}", self.username)?;
        writeln!(f, "channel={channel}")?;
        for line in &self.lines {
            match line {
                TranscriptLine::DateSeparator(label) => writeln!(f, "--- {label} ---")?,
                TranscriptLine::Message {
                    sender,
                    text,
                    time,
                    delivery,
                } => {
                    let marker = match delivery {
                        Delivery::Confirmed => "",
                        Delivery::Sent => " (sent)",
                        Delivery::Pending => " (sending)",
                    };
                    writeln!(f, "[{time}] {}: {text}{marker}", sender_label(*sender))?
                }
            }
        }
        if let Some(agent) = &self.typing {
            writeln!(f, "{agent} is typing…")?;
        }
        Ok(())
    }
}

impl fmt::Display for ConversationRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} [{}] {}",
            if self.active { "*" } else { " " },
            self.id,
            self.channel,
            self.username
        )?;
        if self.needs_agent {
            write!(f, " !needs-agent")?;
        }
        if let Some(agent) = &self.assigned_agent {
            write!(f, " @{agent}")?;
        }
        if !self.preview.is_empty() {
            write!(f, " | {}", self.preview)?;
        }
        Ok(())
    }
}
