use serde::{Deserialize, Serialize};

/// Kind of a real-time event, taken from its `type` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    #[default]
    #[serde(other)]
    Other,
}

/// Kind of conversation, derived from the leading character of its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// `D…` — a direct message with a single user.
    Direct,
    /// `C…` — a public channel.
    Channel,
    /// `G…` — a private group.
    Group,
    /// Anything else, including an empty id.
    Unknown,
}

impl ConversationKind {
    pub fn from_conversation_id(id: &str) -> Self {
        match id.as_bytes().first() {
            Some(b'D') => Self::Direct,
            Some(b'C') => Self::Channel,
            Some(b'G') => Self::Group,
            _ => Self::Unknown,
        }
    }

    pub fn is_direct(self) -> bool {
        self == Self::Direct
    }

    pub fn is_channel(self) -> bool {
        self == Self::Channel
    }

    pub fn is_group(self) -> bool {
        self == Self::Group
    }
}

impl std::fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Direct => "direct",
            Self::Channel => "channel",
            Self::Group => "group",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One event observed on the real-time feed.
///
/// Field names follow the platform's event payload so a raw `message` event
/// deserializes directly. Missing ids deserialize as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type", default)]
    pub kind: EventKind,
    /// Author user id.
    #[serde(default)]
    pub user: String,
    /// Conversation id, type-tagged by its first character.
    #[serde(default)]
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Set when the message was posted by a bot integration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

impl InboundEvent {
    /// Build a plain chat message event.
    pub fn message(
        user: impl Into<String>,
        channel: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::Message,
            user: user.into(),
            channel: channel.into(),
            text: Some(text.into()),
            bot_id: None,
            ts: None,
            thread_ts: None,
        }
    }

    #[must_use]
    pub fn with_bot_id(mut self, bot_id: impl Into<String>) -> Self {
        self.bot_id = Some(bot_id.into());
        self
    }

    /// Message text, or `""` when absent.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn conversation_kind(&self) -> ConversationKind {
        ConversationKind::from_conversation_id(&self.channel)
    }
}
