use synebot_channels::{InboundEvent, ReplyOptions};

use crate::{Context, Error, Result};

/// What a handler wants done after one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerReply {
    /// Text sent back to the conversation. Empty text is not sent.
    pub text: String,
    /// Delivery options; `None` posts as the bot user.
    pub options: Option<ReplyOptions>,
    /// Keep the context for the next turn. `false` closes the conversation.
    pub pending: bool,
}

impl HandlerReply {
    /// Reply and keep the conversation open.
    pub fn pending(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: None,
            pending: true,
        }
    }

    /// Reply and close the conversation.
    pub fn done(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: None,
            pending: false,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ReplyOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// A unit of conversational logic.
///
/// Called synchronously for every admitted event. The context is only
/// borrowed for the duration of the call.
pub trait Handler: Send + Sync {
    fn handle(&self, event: &InboundEvent, context: &mut Context) -> anyhow::Result<HandlerReply>;
}

impl<F> Handler for F
where
    F: Fn(&InboundEvent, &mut Context) -> anyhow::Result<HandlerReply> + Send + Sync,
{
    fn handle(&self, event: &InboundEvent, context: &mut Context) -> anyhow::Result<HandlerReply> {
        self(event, context)
    }
}

pub struct HandlerRegistration {
    pub slot: String,
    pub handler: Box<dyn Handler>,
}

/// Ordered list of handlers, fixed at startup.
///
/// Every handler is registered under an explicit slot id that becomes part
/// of its context keys, so reordering registrations keeps existing
/// conversations attached to the right handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<HandlerRegistration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        slot: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> Result<()> {
        let slot = slot.into();
        if self.handlers.iter().any(|r| r.slot == slot) {
            return Err(Error::duplicate_slot(slot));
        }
        self.handlers.push(HandlerRegistration {
            slot,
            handler: Box::new(handler),
        });
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &HandlerRegistration> {
        self.handlers.iter()
    }

    pub fn slots(&self) -> Vec<&str> {
        self.handlers.iter().map(|r| r.slot.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
