//! Liveness handler: answers every admitted message with a running count.

use {
    serde::{Deserialize, Serialize},
    synebot_channels::InboundEvent,
    synebot_routing::{Context, Handler, HandlerReply},
};

pub const SLOT: &str = "hello";

const ANSWER: &str = "I'm alive!";

#[derive(Debug, Default, Serialize, Deserialize)]
struct HelloState {
    message_number: u64,
}

/// Replies `I'm alive! #n`, where `n` counts messages in the conversation.
/// Always keeps the conversation open.
#[derive(Debug, Default)]
pub struct HelloHandler;

impl Handler for HelloHandler {
    fn handle(&self, _event: &InboundEvent, ctx: &mut Context) -> anyhow::Result<HandlerReply> {
        let mut state: HelloState = ctx.typed_state().unwrap_or_default();
        state.message_number += 1;
        ctx.set_state(&state)?;
        Ok(HandlerReply::pending(format!(
            "{ANSWER} #{}",
            state.message_number
        )))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::Arc,
        synebot_channels::{BotIdentity, DirectorySnapshot},
        synebot_routing::{ContextKey, ContextStore, Dispatcher, HandlerRegistry},
        tokio::sync::mpsc,
    };

    fn dispatcher() -> (Dispatcher, mpsc::UnboundedReceiver<synebot_routing::OutboundReply>) {
        let mut handlers = HandlerRegistry::new();
        handlers.register(SLOT, HelloHandler).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let bot = BotIdentity {
            user_id: "UBOT".into(),
            name: "synebot".into(),
            bot_id: Some("BBOT".into()),
        };
        let d = Dispatcher::new(
            bot,
            Arc::new(DirectorySnapshot::default()),
            handlers,
            ContextStore::default(),
            tx,
        );
        (d, rx)
    }

    #[test]
    fn counts_per_conversation() {
        let (mut d, mut rx) = dispatcher();
        d.on_message(&InboundEvent::message("U1", "D1", "ping"));
        d.on_message(&InboundEvent::message("U1", "D1", "ping"));
        d.on_message(&InboundEvent::message("U2", "D2", "ping"));

        let texts: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|r| r.text)
            .collect();
        assert_eq!(texts, vec!["I'm alive! #1", "I'm alive! #2", "I'm alive! #1"]);
        assert!(d.store().contains(&ContextKey::new("U1", "D1", SLOT)));
    }

    #[test]
    fn keeps_counting_from_stored_state() {
        let (mut d, mut rx) = dispatcher();
        for _ in 0..3 {
            d.on_message(&InboundEvent::message("U1", "C1", "<@UBOT> ping"));
        }
        let last = std::iter::from_fn(|| rx.try_recv().ok()).last().unwrap();
        assert_eq!(last.text, "I'm alive! #3");
        let ctx = d.store().get(&ContextKey::new("U1", "C1", SLOT)).unwrap();
        assert_eq!(ctx.state, serde_json::json!({ "message_number": 3 }));
    }
}
