//! Inbound event model and conversation classification.
//!
//! Everything the routing core needs to know about the chat platform lives
//! here: the shape of an inbound event, the directory of known users and
//! conversations, the admission predicates, and the [`Transport`] capability
//! that a concrete platform integration implements.

pub mod classify;
pub mod directory;
pub mod error;
pub mod event;
pub mod transport;

pub use {
    classify::{Rejection, check_admission},
    directory::{BotIdentity, Channel, Directory, DirectorySnapshot, Group, User, UserProfile},
    error::{Error, Result},
    event::{ConversationKind, EventKind, InboundEvent},
    transport::{EventSender, ReplyOptions, Transport},
};
