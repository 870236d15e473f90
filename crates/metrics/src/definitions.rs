//! Metric name and label definitions.

/// Dispatcher and context store metrics
pub mod routing {
    /// Total inbound events seen by the dispatcher
    pub const EVENTS_RECEIVED_TOTAL: &str = "synebot_events_received_total";
    /// Events admitted to handlers
    pub const EVENTS_ADMITTED_TOTAL: &str = "synebot_events_admitted_total";
    /// Events dropped by the classifier (labelled by `reason`)
    pub const EVENTS_REJECTED_TOTAL: &str = "synebot_events_rejected_total";
    /// Handler invocations (labelled by `slot`)
    pub const HANDLER_INVOCATIONS_TOTAL: &str = "synebot_handler_invocations_total";
    /// Handler invocations that returned an error (labelled by `slot`)
    pub const HANDLER_ERRORS_TOTAL: &str = "synebot_handler_errors_total";
    /// Replies queued for delivery
    pub const REPLIES_QUEUED_TOTAL: &str = "synebot_replies_queued_total";
    /// Contexts currently held in the store
    pub const CONTEXTS_ACTIVE: &str = "synebot_contexts_active";
    /// Contexts removed for inactivity
    pub const CONTEXTS_EXPIRED_TOTAL: &str = "synebot_contexts_expired_total";
}

/// Transport metrics
pub mod transport {
    /// Messages successfully posted to the platform
    pub const MESSAGES_SENT_TOTAL: &str = "synebot_transport_messages_sent_total";
    /// Failed post attempts
    pub const SEND_ERRORS_TOTAL: &str = "synebot_transport_send_errors_total";
    /// Feed (re)connections
    pub const CONNECTIONS_TOTAL: &str = "synebot_transport_connections_total";
}

/// Common label keys
pub mod labels {
    pub const REASON: &str = "reason";
    pub const SLOT: &str = "slot";
    pub const TRANSPORT: &str = "transport";
}
