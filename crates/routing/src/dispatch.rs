//! Per-event dispatch loop.

use std::{sync::Arc, time::Instant};

use {
    synebot_channels::{
        BotIdentity, Directory, InboundEvent, Rejection, ReplyOptions, check_admission,
    },
    tokio::sync::mpsc,
    tracing::{debug, trace, warn},
};

#[cfg(feature = "metrics")]
use synebot_metrics::{counter, gauge, labels, routing as routing_metrics};

use crate::{ContextKey, ContextStore, HandlerRegistry, Resolved};

/// A reply waiting to be delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub conversation_id: String,
    pub text: String,
    pub options: ReplyOptions,
    /// Slot of the handler that produced the reply.
    pub slot: String,
}

/// Queue of replies. Delivery happens elsewhere; the dispatcher never waits.
pub type Outbox = mpsc::UnboundedSender<OutboundReply>;

/// Observable dispatch activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    Rejected {
        conversation_id: String,
        reason: Rejection,
    },
    HandlerReplied {
        slot: String,
        key: ContextKey,
        pending: bool,
    },
    HandlerFailed {
        slot: String,
        key: ContextKey,
        error: String,
    },
    ContextsExpired {
        count: usize,
    },
}

/// Hook for observing the dispatcher without coupling it to a logger.
pub trait DispatchEventSink: Send + Sync {
    fn emit(&self, event: DispatchEvent);
}

/// Result of dispatching one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Rejected(Rejection),
    Dispatched {
        handlers: usize,
        replies: usize,
        failures: usize,
    },
}

/// Routes admitted events through every registered handler.
///
/// Owns the [`ContextStore`]; nothing else mutates it.
pub struct Dispatcher {
    bot: BotIdentity,
    directory: Arc<dyn Directory>,
    handlers: HandlerRegistry,
    store: ContextStore,
    outbox: Outbox,
    event_sink: Option<Arc<dyn DispatchEventSink>>,
}

impl Dispatcher {
    pub fn new(
        bot: BotIdentity,
        directory: Arc<dyn Directory>,
        handlers: HandlerRegistry,
        store: ContextStore,
        outbox: Outbox,
    ) -> Self {
        Self {
            bot,
            directory,
            handlers,
            store,
            outbox,
            event_sink: None,
        }
    }

    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn DispatchEventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn bot(&self) -> &BotIdentity {
        &self.bot
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    /// Handle one inbound event to completion.
    pub fn on_message(&mut self, event: &InboundEvent) -> DispatchOutcome {
        #[cfg(feature = "metrics")]
        counter!(routing_metrics::EVENTS_RECEIVED_TOTAL).increment(1);

        let kind = match check_admission(event, &self.bot) {
            Ok(kind) => kind,
            Err(reason) => {
                trace!(channel = %event.channel, reason = %reason, "event not admitted");
                #[cfg(feature = "metrics")]
                counter!(
                    routing_metrics::EVENTS_REJECTED_TOTAL,
                    labels::REASON => reason.as_str()
                )
                .increment(1);
                self.emit(DispatchEvent::Rejected {
                    conversation_id: event.channel.clone(),
                    reason,
                });
                return DispatchOutcome::Rejected(reason);
            },
        };

        #[cfg(feature = "metrics")]
        counter!(routing_metrics::EVENTS_ADMITTED_TOTAL).increment(1);

        debug!(
            user = %event.user,
            channel = %event.channel,
            kind = %kind,
            handlers = self.handlers.len(),
            "dispatching message"
        );

        let mut replies = 0;
        let mut failures = 0;
        for registration in self.handlers.iter() {
            let slot = registration.slot.as_str();
            let key = ContextKey::for_event(event, slot);

            #[cfg(feature = "metrics")]
            counter!(
                routing_metrics::HANDLER_INVOCATIONS_TOTAL,
                labels::SLOT => slot.to_string()
            )
            .increment(1);

            let mut resolved = self
                .store
                .resolve_or_create(event, slot, self.directory.as_ref());
            let was_stored = resolved.is_stored();
            let result = registration
                .handler
                .handle(event, resolved.context_mut());
            let fresh = match resolved {
                Resolved::Fresh(ctx) => Some(ctx),
                Resolved::Stored(_) => None,
            };

            let reply = match result {
                Ok(reply) => reply,
                Err(e) => {
                    // The handler may have left its state half-written; close
                    // the conversation rather than carry it into the next turn.
                    failures += 1;
                    warn!(slot, key = %key, error = %e, "handler failed");
                    #[cfg(feature = "metrics")]
                    counter!(
                        routing_metrics::HANDLER_ERRORS_TOTAL,
                        labels::SLOT => slot.to_string()
                    )
                    .increment(1);
                    if was_stored {
                        self.store.evict(&key);
                    }
                    self.emit(DispatchEvent::HandlerFailed {
                        slot: slot.to_string(),
                        key,
                        error: e.to_string(),
                    });
                    continue;
                },
            };

            if reply.text.is_empty() {
                debug!(slot, key = %key, "handler returned an empty reply, not sending");
            } else {
                let outbound = OutboundReply {
                    conversation_id: event.channel.clone(),
                    text: reply.text,
                    options: reply.options.unwrap_or_default(),
                    slot: slot.to_string(),
                };
                if self.outbox.send(outbound).is_err() {
                    warn!(slot, key = %key, "outbox closed, reply dropped");
                } else {
                    replies += 1;
                    #[cfg(feature = "metrics")]
                    counter!(routing_metrics::REPLIES_QUEUED_TOTAL).increment(1);
                }
            }

            match (reply.pending, fresh) {
                (true, Some(ctx)) => self.store.retain(ctx),
                (false, None) => {
                    self.store.evict(&key);
                },
                // Stored and pending: already updated in place.
                // Fresh and done: never stored.
                (true, None) | (false, Some(_)) => {},
            }

            trace!(slot, key = %key, pending = reply.pending, "handler finished");
            self.emit(DispatchEvent::HandlerReplied {
                slot: slot.to_string(),
                key,
                pending: reply.pending,
            });
        }

        #[cfg(feature = "metrics")]
        gauge!(routing_metrics::CONTEXTS_ACTIVE).set(self.store.len() as f64);

        DispatchOutcome::Dispatched {
            handlers: self.handlers.len(),
            replies,
            failures,
        }
    }

    /// Drop contexts that have been idle past the configured timeout.
    pub fn expire_idle(&mut self, now: Instant) -> usize {
        let count = self.store.evict_idle(now);
        if count > 0 {
            debug!(count, remaining = self.store.len(), "expired idle contexts");
            #[cfg(feature = "metrics")]
            {
                counter!(routing_metrics::CONTEXTS_EXPIRED_TOTAL).increment(count as u64);
                gauge!(routing_metrics::CONTEXTS_ACTIVE).set(self.store.len() as f64);
            }
            self.emit(DispatchEvent::ContextsExpired { count });
        }
        count
    }

    fn emit(&self, event: DispatchEvent) {
        if let Some(sink) = &self.event_sink {
            sink.emit(event);
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{Context, HandlerReply},
        std::sync::Mutex,
        synebot_channels::{DirectorySnapshot, EventKind},
    };

    fn from_fn<F>(f: F) -> F
    where
        F: Fn(&InboundEvent, &mut Context) -> anyhow::Result<HandlerReply> + Send + Sync + 'static,
    {
        f
    }

    fn bot() -> BotIdentity {
        BotIdentity {
            user_id: "UBOT".into(),
            name: "synebot".into(),
            bot_id: Some("BBOT".into()),
        }
    }

    fn dispatcher(
        handlers: HandlerRegistry,
    ) -> (Dispatcher, mpsc::UnboundedReceiver<OutboundReply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(
            bot(),
            Arc::new(DirectorySnapshot::default()),
            handlers,
            ContextStore::default(),
            tx,
        );
        (dispatcher, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<OutboundReply>) -> Vec<OutboundReply> {
        let mut out = Vec::new();
        while let Ok(reply) = rx.try_recv() {
            out.push(reply);
        }
        out
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<DispatchEvent>>);

    impl DispatchEventSink for Recorder {
        fn emit(&self, event: DispatchEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[test]
    fn rejected_event_is_reported_to_sink() {
        let sink = Arc::new(Recorder::default());
        let (d, _rx) = dispatcher(HandlerRegistry::new());
        let mut d = d.with_event_sink(sink.clone());

        let mut event = InboundEvent::message("U1", "D1", "hi");
        event.kind = EventKind::Other;
        assert_eq!(
            d.on_message(&event),
            DispatchOutcome::Rejected(Rejection::NotChatMessage)
        );
        assert_eq!(sink.0.lock().unwrap().as_slice(), &[DispatchEvent::Rejected {
            conversation_id: "D1".into(),
            reason: Rejection::NotChatMessage,
        }]);
    }

    #[test]
    fn default_options_post_as_bot_user() {
        let mut handlers = HandlerRegistry::new();
        handlers
            .register("echo", from_fn(|e, _| {
                Ok(HandlerReply::done(e.text()))
            }))
            .unwrap();
        let (mut d, mut rx) = dispatcher(handlers);

        d.on_message(&InboundEvent::message("U1", "D1", "ping"));
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].conversation_id, "D1");
        assert_eq!(sent[0].text, "ping");
        assert!(sent[0].options.as_user);
        assert_eq!(sent[0].slot, "echo");
    }

    #[test]
    fn custom_options_pass_through() {
        let mut handlers = HandlerRegistry::new();
        handlers
            .register("threaded", from_fn(|_, _| {
                Ok(HandlerReply::done("ok").with_options(ReplyOptions {
                    as_user: false,
                    thread_ts: Some("1.1".into()),
                    username: Some("helper".into()),
                    icon_emoji: None,
                }))
            }))
            .unwrap();
        let (mut d, mut rx) = dispatcher(handlers);

        d.on_message(&InboundEvent::message("U1", "D1", "ping"));
        let sent = drain(&mut rx);
        assert!(!sent[0].options.as_user);
        assert_eq!(sent[0].options.thread_ts.as_deref(), Some("1.1"));
        assert_eq!(sent[0].options.username.as_deref(), Some("helper"));
    }

    #[test]
    fn empty_reply_is_not_sent_but_retention_applies() {
        let mut handlers = HandlerRegistry::new();
        handlers
            .register("quiet", from_fn(|_, _| {
                Ok(HandlerReply::pending(""))
            }))
            .unwrap();
        let (mut d, mut rx) = dispatcher(handlers);

        let outcome = d.on_message(&InboundEvent::message("U1", "D1", "ping"));
        assert_eq!(outcome, DispatchOutcome::Dispatched {
            handlers: 1,
            replies: 0,
            failures: 0,
        });
        assert!(drain(&mut rx).is_empty());
        assert!(d.store().contains(&ContextKey::new("U1", "D1", "quiet")));
    }

    #[test]
    fn failing_handler_is_isolated() {
        let mut handlers = HandlerRegistry::new();
        handlers
            .register("broken", from_fn(|_, ctx| {
                if ctx.event_count() > 1 {
                    anyhow::bail!("boom");
                }
                Ok(HandlerReply::pending("first"))
            }))
            .unwrap();
        handlers
            .register("steady", from_fn(|_, _| {
                Ok(HandlerReply::pending("steady"))
            }))
            .unwrap();
        let sink = Arc::new(Recorder::default());
        let (d, mut rx) = dispatcher(handlers);
        let mut d = d.with_event_sink(sink.clone());

        d.on_message(&InboundEvent::message("U1", "D1", "one"));
        assert_eq!(drain(&mut rx).len(), 2);

        let outcome = d.on_message(&InboundEvent::message("U1", "D1", "two"));
        assert_eq!(outcome, DispatchOutcome::Dispatched {
            handlers: 2,
            replies: 1,
            failures: 1,
        });
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].slot, "steady");

        assert!(!d.store().contains(&ContextKey::new("U1", "D1", "broken")));
        let steady = d
            .store()
            .get(&ContextKey::new("U1", "D1", "steady"))
            .unwrap();
        assert_eq!(steady.event_count(), 2);

        let events = sink.0.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            DispatchEvent::HandlerFailed { slot, error, .. } if slot == "broken" && error == "boom"
        )));
    }

    #[test]
    fn closed_outbox_does_not_stop_dispatch() {
        let mut handlers = HandlerRegistry::new();
        handlers
            .register("echo", from_fn(|e, _| {
                Ok(HandlerReply::pending(e.text()))
            }))
            .unwrap();
        let (mut d, rx) = dispatcher(handlers);
        drop(rx);

        let outcome = d.on_message(&InboundEvent::message("U1", "D1", "ping"));
        assert_eq!(outcome, DispatchOutcome::Dispatched {
            handlers: 1,
            replies: 0,
            failures: 0,
        });
        assert_eq!(d.store().len(), 1);
    }

    #[test]
    fn expire_idle_reports_count() {
        let mut handlers = HandlerRegistry::new();
        handlers
            .register("keep", from_fn(|_, _| {
                Ok(HandlerReply::pending("kept"))
            }))
            .unwrap();
        let (mut d, _rx) = dispatcher(handlers);

        d.on_message(&InboundEvent::message("U1", "D1", "ping"));
        assert_eq!(d.expire_idle(Instant::now()), 0);

        let timeout = d.store().limits().idle_timeout.unwrap();
        let later = Instant::now() + timeout + std::time::Duration::from_secs(1);
        assert_eq!(d.expire_idle(later), 1);
        assert!(d.store().is_empty());
    }
}
