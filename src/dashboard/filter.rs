use crate::api::{Channel, Conversation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignmentFilter {
    Unassigned,
    Yours,
    Team,
    #[default]
    All,
}

impl AssignmentFilter {
    pub const ALL: [AssignmentFilter; 4] = [Self::Unassigned, Self::Yours, Self::Team, Self::All];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::Yours => "yours",
            Self::Team => "team",
            Self::All => "all",
        }
    }

    /// Unknown values mean "no filter".
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "unassigned" => Self::Unassigned,
            "yours" | "you" | "mine" => Self::Yours,
            "team" | "others" => Self::Team,
            _ => Self::All,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::Unassigned => Self::Yours,
            Self::Yours => Self::Team,
            Self::Team => Self::All,
            Self::All => Self::Unassigned,
        }
    }

    pub fn matches(self, conversation: &Conversation, agent_id: Option<&str>) -> bool {
        let assigned = conversation.assigned_agent.as_deref();
        match self {
            Self::All => true,
            Self::Unassigned => assigned.is_none(),
            Self::Yours => assigned.is_some() && assigned == agent_id,
            Self::Team => assigned.is_some() && assigned != agent_id,
        }
    }
}

impl std::fmt::Display for AssignmentFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversationFilter {
    pub assignment: AssignmentFilter,
    /// `None` lets every channel through.
    pub channel: Option<Channel>,
}

impl ConversationFilter {
    pub fn new(assignment: AssignmentFilter, channel: Option<Channel>) -> Self {
        Self {
            assignment,
            channel,
        }
    }

    /// Builds a filter from loose user input; unrecognized parts pass
    /// everything through.
    pub fn parse_lenient(assignment: Option<&str>, channel: Option<&str>) -> Self {
        Self {
            assignment: assignment
                .map(AssignmentFilter::parse_lenient)
                .unwrap_or_default(),
            channel: channel.and_then(Channel::parse),
        }
    }

    pub fn with_assignment(&self, assignment: AssignmentFilter) -> Self {
        Self {
            assignment,
            channel: self.channel.clone(),
        }
    }

    pub fn matches(&self, conversation: &Conversation, agent_id: Option<&str>) -> bool {
        let channel_ok = self
            .channel
            .as_ref()
            .map(|channel| &conversation.channel == channel)
            .unwrap_or(true);
        channel_ok && self.assignment.matches(conversation, agent_id)
    }

    pub fn next_channel(&self) -> Option<Channel> {
        match self.channel {
            None => Some(Channel::Webchat),
            Some(Channel::Webchat) => Some(Channel::Whatsapp),
            Some(Channel::Whatsapp) => Some(Channel::Instagram),
            Some(Channel::Instagram) | Some(Channel::Unknown) => None,
        }
    }
}

/// Per-bucket counts over the unfiltered fetched set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BucketCounts {
    pub unassigned: usize,
    pub yours: usize,
    pub team: usize,
    pub all: usize,
}

impl BucketCounts {
    pub fn get(&self, filter: AssignmentFilter) -> usize {
        match filter {
            AssignmentFilter::Unassigned => self.unassigned,
            AssignmentFilter::Yours => self.yours,
            AssignmentFilter::Team => self.team,
            AssignmentFilter::All => self.all,
        }
    }
}

pub fn bucket_counts(conversations: &[Conversation], agent_id: Option<&str>) -> BucketCounts {
    let mut counts = BucketCounts {
        all: conversations.len(),
        ..BucketCounts::default()
    };
    for conversation in conversations {
        if AssignmentFilter::Unassigned.matches(conversation, agent_id) {
            counts.unassigned += 1;
        } else if AssignmentFilter::Yours.matches(conversation, agent_id) {
            counts.yours += 1;
        } else {
            counts.team += 1;
        }
    }
    counts
}

pub fn apply_filter<'a>(
    conversations: &'a [Conversation],
    filter: &ConversationFilter,
    agent_id: Option<&str>,
) -> Vec<&'a Conversation> {
    conversations
        .iter()
        .filter(|conversation| filter.matches(conversation, agent_id))
        .collect()
}
