//! Route inbound chat messages to handlers and keep per-conversation context.
//!
//! For every admitted event the [`Dispatcher`] walks the handler registry in
//! order. Each handler gets its own [`Context`] keyed by
//! `author@conversation:slot`, which survives across turns for as long as the
//! handler reports the conversation as pending.

pub mod context;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod runtime;

pub use {
    context::{Context, ContextKey, ContextLimits, ContextStore, Resolved},
    dispatch::{
        DispatchEvent, DispatchEventSink, DispatchOutcome, Dispatcher, OutboundReply, Outbox,
    },
    error::{Error, Result},
    handler::{Handler, HandlerRegistration, HandlerRegistry, HandlerReply},
    runtime::BotRuntime,
};
