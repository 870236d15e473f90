//! Metric names and recorder setup for synebot.
//!
//! Recording goes through the `metrics` crate facade, so every call is a
//! no-op until the binary installs a recorder with [`init_metrics`].
//!
//! ```rust,ignore
//! use synebot_metrics::{counter, routing};
//!
//! counter!(routing::EVENTS_RECEIVED_TOTAL).increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge};
