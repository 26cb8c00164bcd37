use crate::api::{Channel, Message, Sender, TranscriptPayload};
use crate::shared::ConversationId;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Appended locally, request not answered yet.
    Pending,
    /// Accepted by the server, push confirmation not seen yet.
    Sent,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub local_id: u64,
    pub message: Message,
    pub delivery: Delivery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    conversation_id: ConversationId,
    username: String,
    channel: Option<Channel>,
    entries: Vec<TranscriptEntry>,
    next_local_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptLine {
    DateSeparator(String),
    Message {
        sender: Sender,
        text: String,
        time: String,
        delivery: Delivery,
    },
}

impl Transcript {
    pub fn from_history(conversation_id: ConversationId, payload: TranscriptPayload) -> Self {
        let mut messages = payload.messages;
        messages.sort_by_key(|message| message.timestamp);
        let entries: Vec<TranscriptEntry> = messages
            .into_iter()
            .enumerate()
            .map(|(index, message)| TranscriptEntry {
                local_id: index as u64,
                message,
                delivery: Delivery::Confirmed,
            })
            .collect();
        Self {
            conversation_id,
            username: payload.username,
            channel: payload.channel,
            next_local_id: entries.len() as u64,
            entries,
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn has_unconfirmed(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.delivery != Delivery::Confirmed)
    }

    pub fn push_pending(&mut self, text: &str, agent: Option<&str>, now: DateTime<Utc>) -> u64 {
        let local_id = self.next_local_id;
        self.next_local_id += 1;
        self.entries.push(TranscriptEntry {
            local_id,
            message: Message {
                agent: agent.map(str::to_string),
                server_time: false,
                ..Message::new(self.conversation_id.clone(), Sender::Agent, text, now)
            },
            delivery: Delivery::Pending,
        });
        local_id
    }

    pub fn mark_sent(&mut self, local_id: u64) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.local_id == local_id && entry.delivery == Delivery::Pending)
        {
            entry.delivery = Delivery::Sent;
        }
    }

    pub fn remove(&mut self, local_id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.local_id != local_id);
        self.entries.len() != before
    }

    /// Applies a pushed message. An agent message from the same author as
    /// an unconfirmed local copy with the same text confirms that copy
    /// instead of appending. A message already present under the same
    /// server id or server timestamp is ignored. Returns whether the
    /// transcript changed.
    pub fn apply_incoming(&mut self, message: Message) -> bool {
        if message.conversation_id != self.conversation_id {
            return false;
        }

        if message.sender == Sender::Agent {
            if let Some(entry) = self.entries.iter_mut().find(|entry| {
                entry.delivery != Delivery::Confirmed
                    && entry.message.text == message.text
                    && same_author(&entry.message, &message)
            }) {
                entry.delivery = Delivery::Confirmed;
                entry.message.timestamp = message.timestamp;
                entry.message.server_time = message.server_time;
                entry.message.id = message.id;
                if message.agent.is_some() {
                    entry.message.agent = message.agent;
                }
                self.entries.sort_by_key(|entry| entry.message.timestamp);
                return true;
            }
        }

        let already_shown = self.entries.iter().any(|entry| {
            entry.delivery == Delivery::Confirmed && entry.message.is_same_record(&message)
        });
        if already_shown {
            return false;
        }

        let local_id = self.next_local_id;
        self.next_local_id += 1;
        let position = self
            .entries
            .iter()
            .position(|entry| entry.message.timestamp > message.timestamp)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            position,
            TranscriptEntry {
                local_id,
                message,
                delivery: Delivery::Confirmed,
            },
        );
        true
    }

    /// Messages in timestamp order with a separator before the first
    /// message of every calendar day in `tz`.
    pub fn lines(&self, tz: Tz, today: NaiveDate) -> Vec<TranscriptLine> {
        let mut lines = Vec::with_capacity(self.entries.len() + 1);
        let mut previous_day: Option<NaiveDate> = None;
        for entry in &self.entries {
            let local = entry.message.timestamp.with_timezone(&tz);
            let day = local.date_naive();
            if previous_day != Some(day) {
                lines.push(TranscriptLine::DateSeparator(separator_label(day, today)));
                previous_day = Some(day);
            }
            lines.push(TranscriptLine::Message {
                sender: entry.message.sender,
                text: entry.message.text.clone(),
                time: local.format("%H:%M").to_string(),
                delivery: entry.delivery,
            });
        }
        lines
    }
}

/// A push that does not name its agent is taken to be ours.
fn same_author(pending: &Message, incoming: &Message) -> bool {
    match (&pending.agent, &incoming.agent) {
        (Some(mine), Some(theirs)) => mine == theirs,
        _ => true,
    }
}

pub fn separator_label(day: NaiveDate, today: NaiveDate) -> String {
    if day == today {
        return "Today".to_string();
    }
    if today.pred_opt() == Some(day) {
        return "Yesterday".to_string();
    }
    day.format("%b %-d, %Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn id() -> ConversationId {
        ConversationId::parse("42").expect("id")
    }

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    fn message(sender: Sender, text: &str, ts: &str) -> Message {
        Message::new(id(), sender, text, at(ts))
    }

    fn arrived(sender: Sender, text: &str, ts: &str) -> Message {
        Message {
            server_time: false,
            ..message(sender, text, ts)
        }
    }

    fn history(messages: Vec<Message>) -> Transcript {
        Transcript::from_history(
            id(),
            TranscriptPayload {
                username: "Ana".to_string(),
                channel: Some(Channel::Whatsapp),
                messages,
            },
        )
    }

    #[test]
    fn history_is_sorted_ascending_and_stable() {
        let transcript = history(vec![
            message(Sender::Ai, "second", "2026-10-16T09:00:00Z"),
            message(Sender::User, "first", "2026-10-15T09:00:00Z"),
            message(Sender::User, "third", "2026-10-16T09:00:00Z"),
        ]);
        let texts: Vec<&str> = transcript
            .entries()
            .iter()
            .map(|entry| entry.message.text.as_str())
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn separators_label_today_yesterday_and_absolute_dates() {
        let transcript = history(vec![
            message(Sender::User, "old", "2026-10-01T12:00:00Z"),
            message(Sender::User, "y1", "2026-10-15T08:00:00Z"),
            message(Sender::Ai, "y2", "2026-10-15T08:01:00Z"),
            message(Sender::User, "t1", "2026-10-16T07:30:00Z"),
        ]);
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).expect("date");
        let separators: Vec<String> = transcript
            .lines(chrono_tz::UTC, today)
            .into_iter()
            .filter_map(|line| match line {
                TranscriptLine::DateSeparator(label) => Some(label),
                TranscriptLine::Message { .. } => None,
            })
            .collect();
        assert_eq!(separators, vec!["Oct 1, 2026", "Yesterday", "Today"]);
    }

    #[test]
    fn calendar_day_follows_the_configured_zone() {
        let transcript = history(vec![
            message(Sender::User, "late", "2026-10-15T23:30:00Z"),
            message(Sender::User, "early", "2026-10-16T00:30:00Z"),
        ]);
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).expect("date");
        let utc_lines = transcript.lines(chrono_tz::UTC, today);
        let tokyo_lines = transcript.lines(chrono_tz::Asia::Tokyo, today);
        assert_eq!(utc_lines.len(), 4);
        assert_eq!(tokyo_lines.len(), 3);
        assert_eq!(
            tokyo_lines[1],
            TranscriptLine::Message {
                sender: Sender::User,
                text: "late".to_string(),
                time: "08:30".to_string(),
                delivery: Delivery::Confirmed,
            }
        );
    }

    #[test]
    fn pushed_agent_message_confirms_pending_copy() {
        let mut transcript = history(Vec::new());
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 10, 0, 0).single().expect("now");
        let local_id = transcript.push_pending("On it!", Some("agent1"), now);
        transcript.mark_sent(local_id);
        assert!(transcript.has_unconfirmed());

        assert!(transcript.apply_incoming(message(Sender::Agent, "On it!", "2026-10-16T10:00:01Z")));
        assert_eq!(transcript.entries().len(), 1);
        assert_eq!(transcript.entries()[0].delivery, Delivery::Confirmed);
        assert!(!transcript.has_unconfirmed());
    }

    #[test]
    fn another_agents_identical_text_does_not_confirm_my_copy() {
        let mut transcript = history(Vec::new());
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 10, 0, 0).single().expect("now");
        let local_id = transcript.push_pending("ok", Some("agent1"), now);
        transcript.mark_sent(local_id);

        let theirs = Message {
            agent: Some("agent2".to_string()),
            ..message(Sender::Agent, "ok", "2026-10-16T10:00:01Z")
        };
        assert!(transcript.apply_incoming(theirs));
        assert_eq!(transcript.entries().len(), 2);
        assert!(transcript.has_unconfirmed());

        let mine = Message {
            agent: Some("agent1".to_string()),
            ..message(Sender::Agent, "ok", "2026-10-16T10:00:02Z")
        };
        assert!(transcript.apply_incoming(mine));
        assert_eq!(transcript.entries().len(), 2);
        assert!(!transcript.has_unconfirmed());
    }

    #[test]
    fn repeated_guest_text_is_kept_as_separate_messages() {
        let mut transcript = history(Vec::new());
        assert!(transcript.apply_incoming(arrived(Sender::User, "yes", "2026-10-16T10:00:00Z")));
        assert!(transcript.apply_incoming(arrived(Sender::User, "yes", "2026-10-16T10:00:00Z")));
        assert!(transcript.apply_incoming(message(Sender::User, "yes", "2026-10-16T10:00:01Z")));
        assert_eq!(transcript.entries().len(), 3);
    }

    #[test]
    fn push_copy_of_a_loaded_record_is_ignored() {
        let mut transcript = history(vec![Message {
            id: Some("901".to_string()),
            ..message(Sender::User, "hi", "2026-10-16T10:00:00Z")
        }]);
        assert!(!transcript.apply_incoming(message(Sender::User, "hi", "2026-10-16T10:00:00Z")));
        assert!(!transcript.apply_incoming(Message {
            id: Some("901".to_string()),
            ..arrived(Sender::User, "hi", "2026-10-16T10:00:03Z")
        }));
        assert!(transcript.apply_incoming(Message {
            id: Some("902".to_string()),
            ..message(Sender::User, "hi", "2026-10-16T10:00:00Z")
        }));
        assert_eq!(transcript.entries().len(), 2);
    }

    #[test]
    fn messages_for_other_conversations_are_ignored() {
        let mut transcript = history(Vec::new());
        let mut other = message(Sender::User, "hello", "2026-10-16T10:00:00Z");
        other.conversation_id = ConversationId::parse("7").expect("id");
        assert!(!transcript.apply_incoming(other));
        assert!(transcript.entries().is_empty());
    }

    #[test]
    fn removing_a_pending_entry() {
        let mut transcript = history(Vec::new());
        let local_id = transcript.push_pending("oops", None, Utc::now());
        assert!(transcript.remove(local_id));
        assert!(!transcript.remove(local_id));
    }
}
