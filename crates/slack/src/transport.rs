use std::time::Duration;

use {
    async_trait::async_trait,
    synebot_channels::{DirectorySnapshot, EventSender, ReplyOptions, Transport},
    synebot_config::SlackConfig,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use synebot_metrics::{counter, labels, transport as transport_metrics};

use crate::{api::SlackApi, socket::SocketModeFeed};

const TRANSPORT_ID: &str = "slack";

/// [`Transport`] backed by the Slack Web API and Socket Mode.
pub struct SlackTransport {
    api: SlackApi,
    max_backoff: Duration,
}

impl SlackTransport {
    pub fn new(api: SlackApi, max_backoff: Duration) -> Self {
        Self { api, max_backoff }
    }

    pub fn from_config(config: &SlackConfig) -> Self {
        Self::new(SlackApi::from_config(config), config.max_reconnect_backoff())
    }
}

#[async_trait]
impl Transport for SlackTransport {
    fn id(&self) -> &str {
        TRANSPORT_ID
    }

    async fn load_directory(&self) -> synebot_channels::Result<DirectorySnapshot> {
        let auth = self.api.auth_test().await?;
        info!(
            user_id = %auth.user_id,
            user = %auth.user,
            team = auth.team.as_deref().unwrap_or("unknown"),
            bot_id = ?auth.bot_id,
            "slack bot authenticated"
        );

        let directory = self.api.directory().await?;
        debug!(
            users = directory.user_count(),
            channels = directory.channel_count(),
            groups = directory.group_count(),
            "slack directory loaded"
        );
        Ok(directory)
    }

    async fn connect(
        &self,
        events: EventSender,
        cancel: CancellationToken,
    ) -> synebot_channels::Result<()> {
        SocketModeFeed::new(self.api.clone(), self.max_backoff)
            .run(events, cancel)
            .await?;
        Ok(())
    }

    async fn post_message(
        &self,
        conversation_id: &str,
        text: &str,
        options: &ReplyOptions,
    ) -> synebot_channels::Result<()> {
        match self
            .api
            .chat_post_message(conversation_id, text, options)
            .await
        {
            Ok(posted) => {
                debug!(
                    conversation_id,
                    ts = posted.ts.as_deref().unwrap_or_default(),
                    "message posted"
                );
                #[cfg(feature = "metrics")]
                counter!(transport_metrics::MESSAGES_SENT_TOTAL, labels::TRANSPORT => TRANSPORT_ID)
                    .increment(1);
                Ok(())
            },
            Err(e) => {
                warn!(conversation_id, error = %e, "failed to post message");
                #[cfg(feature = "metrics")]
                counter!(transport_metrics::SEND_ERRORS_TOTAL, labels::TRANSPORT => TRANSPORT_ID)
                    .increment(1);
                Err(e.into())
            },
        }
    }
}
