//! Slack integration: Web API client, Socket Mode feed and the
//! [`Transport`](synebot_channels::Transport) implementation that ties them
//! together.

pub mod api;
pub mod error;
pub mod socket;
pub mod transport;

pub use {
    api::{AuthInfo, SlackApi},
    error::{Error, Result},
    transport::SlackTransport,
};
