use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
};

use crate::{DirectorySnapshot, InboundEvent, Result};

/// Sender end of the inbound event feed.
pub type EventSender = mpsc::Sender<InboundEvent>;

/// Delivery options for an outbound reply. Opaque to the routing core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyOptions {
    /// Post as the bot user rather than as a generic integration.
    pub as_user: bool,
    /// Reply inside this thread.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
}

impl Default for ReplyOptions {
    fn default() -> Self {
        Self {
            as_user: true,
            thread_ts: None,
            username: None,
            icon_emoji: None,
        }
    }
}

impl ReplyOptions {
    #[must_use]
    pub fn in_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }
}

/// Connection to a chat platform.
///
/// The routing core only ever talks to the platform through this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Platform identifier (e.g. "slack").
    fn id(&self) -> &str;

    /// Fetch the users, channels and groups visible to the bot.
    async fn load_directory(&self) -> Result<DirectorySnapshot>;

    /// Receive real-time events and forward them to `events` until `cancel`
    /// fires or the feed fails permanently.
    async fn connect(&self, events: EventSender, cancel: CancellationToken) -> Result<()>;

    /// Post a message to a conversation.
    async fn post_message(
        &self,
        conversation_id: &str,
        text: &str,
        options: &ReplyOptions,
    ) -> Result<()>;
}
