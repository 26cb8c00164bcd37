use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub level: NoticeLevel,
    pub text: String,
    expires_at: Instant,
}

/// Toast-style notifications: dismissible, and gone after the ttl.
#[derive(Debug, Clone)]
pub struct Notices {
    ttl: Duration,
    next_id: u64,
    items: Vec<Notice>,
}

impl Notices {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            next_id: 1,
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, level: NoticeLevel, text: impl Into<String>, now: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.items.push(Notice {
            id,
            level,
            text: text.into(),
            expires_at: now + self.ttl,
        });
        id
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.items.len();
        self.items.retain(|notice| notice.id != id);
        self.items.len() != before
    }

    pub fn dismiss_latest(&mut self) -> bool {
        self.items.pop().is_some()
    }

    pub fn expire(&mut self, now: Instant) {
        self.items.retain(|notice| notice.expires_at > now);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn active(&self, now: Instant) -> Vec<&Notice> {
        self.items
            .iter()
            .filter(|notice| notice.expires_at > now)
            .collect()
    }

    pub fn all(&self) -> &[Notice] {
        &self.items
    }
}
