//! Bot lifecycle: connect, resolve identity, dispatch, deliver.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    synebot_channels::{BotIdentity, Directory, Transport},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    ContextLimits, ContextStore, DispatchEventSink, Dispatcher, HandlerRegistry, OutboundReply,
    Result,
};

/// Inbound events buffered between the feed and the dispatcher.
const EVENT_BUFFER: usize = 256;

/// How often idle contexts are swept.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Runs a bot against a transport until cancelled.
pub struct BotRuntime {
    transport: Arc<dyn Transport>,
    bot_name: String,
    handlers: HandlerRegistry,
    limits: ContextLimits,
    sweep_interval: Duration,
    event_sink: Option<Arc<dyn DispatchEventSink>>,
}

impl BotRuntime {
    pub fn new(
        transport: Arc<dyn Transport>,
        bot_name: impl Into<String>,
        handlers: HandlerRegistry,
    ) -> Self {
        Self {
            transport,
            bot_name: bot_name.into(),
            handlers,
            limits: ContextLimits::default(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            event_sink: None,
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: ContextLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn DispatchEventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Connect and process events one at a time until `cancel` fires or the
    /// feed ends.
    ///
    /// Fails before dispatching anything if the bot's own user cannot be
    /// found in the directory.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let transport = self.transport;

        let directory = transport.load_directory().await?;
        info!(
            transport = transport.id(),
            users = directory.user_count(),
            channels = directory.channel_count(),
            groups = directory.group_count(),
            "directory loaded"
        );

        let bot = BotIdentity::resolve(&directory, &self.bot_name)?;
        info!(
            user_id = %bot.user_id,
            name = %bot.name,
            bot_id = ?bot.bot_id,
            "bot identity resolved"
        );

        let directory: Arc<dyn Directory> = Arc::new(directory);
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        let mut dispatcher = Dispatcher::new(
            bot,
            directory,
            self.handlers,
            ContextStore::new(self.limits),
            outbox,
        );
        if let Some(sink) = self.event_sink {
            dispatcher = dispatcher.with_event_sink(sink);
        }

        let delivery = tokio::spawn(deliver_replies(Arc::clone(&transport), outbox_rx));

        let (event_tx, mut event_rx) = mpsc::channel(EVENT_BUFFER);
        let feed = {
            let transport = Arc::clone(&transport);
            let cancel = cancel.clone();
            tokio::spawn(async move { transport.connect(event_tx, cancel).await })
        };

        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("bot runtime cancelled");
                    break;
                }
                event = event_rx.recv() => {
                    let Some(event) = event else {
                        debug!("event feed closed");
                        break;
                    };
                    dispatcher.on_message(&event);
                }
                _ = sweep.tick() => {
                    dispatcher.expire_idle(Instant::now());
                }
            }
        }

        // Dropping the dispatcher closes the outbox so delivery can drain.
        drop(dispatcher);
        cancel.cancel();
        // Unblocks a feed stuck sending into a full buffer.
        drop(event_rx);
        if let Err(e) = delivery.await {
            warn!(error = %e, "reply delivery task panicked");
        }
        feed.await??;
        Ok(())
    }
}

/// Send queued replies through the transport. Failures are logged, never
/// reported back to the dispatcher.
async fn deliver_replies(
    transport: Arc<dyn Transport>,
    mut outbox: mpsc::UnboundedReceiver<OutboundReply>,
) {
    while let Some(reply) = outbox.recv().await {
        match transport
            .post_message(&reply.conversation_id, &reply.text, &reply.options)
            .await
        {
            Ok(()) => {
                debug!(
                    channel = %reply.conversation_id,
                    slot = %reply.slot,
                    "reply delivered"
                );
            },
            Err(e) => {
                warn!(
                    channel = %reply.conversation_id,
                    slot = %reply.slot,
                    error = %e,
                    "failed to deliver reply"
                );
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{Context, HandlerReply},
        async_trait::async_trait,
        std::sync::Mutex,
        synebot_channels::{
            Channel, DirectorySnapshot, Error as ChannelError, EventSender, Group, InboundEvent,
            ReplyOptions, User, UserProfile,
        },
    };

    /// Transport that replays a fixed list of events and records posts.
    struct FakeTransport {
        users: Vec<User>,
        events: Vec<InboundEvent>,
        posted: Mutex<Vec<(String, String)>>,
    }

    impl FakeTransport {
        fn new(events: Vec<InboundEvent>) -> Self {
            Self {
                users: vec![User {
                    id: "UBOT".into(),
                    name: "synebot".into(),
                    is_bot: true,
                    profile: UserProfile {
                        bot_id: Some("BBOT".into()),
                        ..Default::default()
                    },
                    ..Default::default()
                }],
                events,
                posted: Mutex::new(Vec::new()),
            }
        }

        fn posted(&self) -> Vec<(String, String)> {
            self.posted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn id(&self) -> &str {
            "fake"
        }

        async fn load_directory(&self) -> synebot_channels::Result<DirectorySnapshot> {
            Ok(DirectorySnapshot::new(
                self.users.clone(),
                Vec::<Channel>::new(),
                Vec::<Group>::new(),
            ))
        }

        async fn connect(
            &self,
            events: EventSender,
            cancel: CancellationToken,
        ) -> synebot_channels::Result<()> {
            for event in &self.events {
                events
                    .send(event.clone())
                    .await
                    .map_err(|_| ChannelError::unavailable("dispatcher gone"))?;
            }
            cancel.cancelled().await;
            Ok(())
        }

        async fn post_message(
            &self,
            conversation_id: &str,
            text: &str,
            _options: &ReplyOptions,
        ) -> synebot_channels::Result<()> {
            self.posted
                .lock()
                .unwrap()
                .push((conversation_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn counting(_: &InboundEvent, ctx: &mut Context) -> anyhow::Result<HandlerReply> {
        Ok(HandlerReply::pending(format!("turn {}", ctx.event_count())))
    }

    async fn wait_for_posts(transport: &FakeTransport, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while transport.posted().len() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn dispatches_feed_and_delivers_replies() {
        let transport = Arc::new(FakeTransport::new(vec![
            InboundEvent::message("U1", "D1", "hello"),
            InboundEvent::message("U1", "C1", "not for the bot"),
            InboundEvent::message("UBOT", "D1", "echo").with_bot_id("BBOT"),
            InboundEvent::message("U1", "D1", "again"),
        ]));
        let mut handlers = HandlerRegistry::new();
        handlers.register("count", counting).unwrap();

        let cancel = CancellationToken::new();
        let runtime = BotRuntime::new(transport.clone(), "synebot", handlers);
        let task = tokio::spawn(runtime.run(cancel.clone()));

        wait_for_posts(&transport, 2).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(transport.posted(), vec![
            ("D1".to_string(), "turn 1".to_string()),
            ("D1".to_string(), "turn 2".to_string()),
        ]);
    }

    /// Transport whose feed pushes events without ever watching `cancel`.
    struct FloodTransport {
        inner: FakeTransport,
        count: usize,
    }

    #[async_trait]
    impl Transport for FloodTransport {
        fn id(&self) -> &str {
            "flood"
        }

        async fn load_directory(&self) -> synebot_channels::Result<DirectorySnapshot> {
            self.inner.load_directory().await
        }

        async fn connect(
            &self,
            events: EventSender,
            _cancel: CancellationToken,
        ) -> synebot_channels::Result<()> {
            for _ in 0..self.count {
                let event = InboundEvent::message("U1", "C1", "not for the bot");
                if events.send(event).await.is_err() {
                    return Ok(());
                }
            }
            std::future::pending().await
        }

        async fn post_message(
            &self,
            conversation_id: &str,
            text: &str,
            options: &ReplyOptions,
        ) -> synebot_channels::Result<()> {
            self.inner.post_message(conversation_id, text, options).await
        }
    }

    #[tokio::test]
    async fn shutdown_does_not_wait_on_a_blocked_feed() {
        let transport = Arc::new(FloodTransport {
            inner: FakeTransport::new(Vec::new()),
            count: EVENT_BUFFER * 4,
        });
        let mut handlers = HandlerRegistry::new();
        handlers.register("count", counting).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let runtime = BotRuntime::new(transport, "synebot", handlers);
        tokio::time::timeout(Duration::from_secs(5), runtime.run(cancel))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_bot_name_is_fatal() {
        let transport = Arc::new(FakeTransport::new(vec![InboundEvent::message(
            "U1", "D1", "hello",
        )]));
        let mut handlers = HandlerRegistry::new();
        handlers.register("count", counting).unwrap();

        let runtime = BotRuntime::new(transport.clone(), "someone-else", handlers);
        let err = runtime.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Channel(ChannelError::UnknownBotUser { .. })
        ));
        assert!(transport.posted().is_empty());
    }
}
