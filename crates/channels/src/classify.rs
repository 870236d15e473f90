//! Admission predicates over inbound events.
//!
//! All functions are pure: they only inspect the event and the bot identity.

use crate::{BotIdentity, ConversationKind, EventKind, InboundEvent};

/// A `message` event carrying non-empty text.
pub fn is_chat_message(event: &InboundEvent) -> bool {
    event.kind == EventKind::Message && !event.text().is_empty()
}

pub fn conversation_kind(event: &InboundEvent) -> ConversationKind {
    event.conversation_kind()
}

/// The event was posted by this bot, either through its own integration
/// (matching bot marker) or under its own user id.
///
/// The author check still holds when the directory record carries no bot
/// marker, so the bot can never answer itself.
pub fn is_from_bot(event: &InboundEvent, bot: &BotIdentity) -> bool {
    let same_marker = match (&event.bot_id, &bot.bot_id) {
        (Some(event_bot), Some(own)) => event_bot == own,
        _ => false,
    };
    same_marker || (!bot.user_id.is_empty() && event.user == bot.user_id)
}

pub fn mentions_bot(event: &InboundEvent, bot: &BotIdentity) -> bool {
    event.text().contains(&bot.mention_token())
}

/// Decide whether an event should be dispatched to handlers.
///
/// Returns the conversation kind when admitted, or `Err(reason)` when the
/// event should be silently dropped.
pub fn check_admission(
    event: &InboundEvent,
    bot: &BotIdentity,
) -> Result<ConversationKind, Rejection> {
    if !is_chat_message(event) {
        return Err(Rejection::NotChatMessage);
    }
    if is_from_bot(event, bot) {
        return Err(Rejection::FromBot);
    }
    let kind = conversation_kind(event);
    if kind.is_direct() || mentions_bot(event, bot) {
        Ok(kind)
    } else {
        Err(Rejection::NotAddressed)
    }
}

/// Reason an inbound event was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotChatMessage,
    FromBot,
    NotAddressed,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotChatMessage => "not_chat_message",
            Self::FromBot => "from_bot",
            Self::NotAddressed => "not_addressed",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotChatMessage => write!(f, "not a chat message"),
            Self::FromBot => write!(f, "posted by the bot itself"),
            Self::NotAddressed => write!(f, "bot was not mentioned outside a direct conversation"),
        }
    }
}
