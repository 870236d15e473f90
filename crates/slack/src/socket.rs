//! Socket Mode event feed.
//!
//! Slack pushes events over a WebSocket opened with the app-level token.
//! Every envelope carrying an `envelope_id` must be acknowledged promptly or
//! Slack redelivers it. The connection is periodically refreshed by the
//! server (`disconnect` frame), in which case we reconnect immediately;
//! transport failures reconnect with exponential backoff.

use std::time::Duration;

use {
    futures::{SinkExt, StreamExt},
    serde::Deserialize,
    synebot_channels::{EventSender, InboundEvent},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use synebot_metrics::{counter, labels, transport as transport_metrics};

use crate::{Error, Result, api::SlackApi};

/// First reconnect delay; doubles on every consecutive failure.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Slack error codes that no amount of reconnecting will fix.
const FATAL_API_ERRORS: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "not_allowed_token_type",
];

/// A decoded Socket Mode frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Hello,
    /// The server is about to close this connection.
    Disconnect { reason: Option<String> },
    /// An Events API envelope. `event` is `None` when the inner payload is
    /// not an event we can represent.
    EventsApi {
        envelope_id: String,
        event: Option<InboundEvent>,
    },
    /// Slash commands, interactivity and similar: acknowledged, not routed.
    Unrouted { envelope_id: String, kind: String },
    Other { kind: String },
}

impl Frame {
    pub fn envelope_id(&self) -> Option<&str> {
        match self {
            Self::EventsApi { envelope_id, .. } | Self::Unrouted { envelope_id, .. } => {
                Some(envelope_id)
            },
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Option<serde_json::Value>,
    #[serde(default)]
    reason: Option<String>,
}

/// Decode one text frame.
pub fn parse_frame(text: &str) -> Result<Frame> {
    let raw: RawEnvelope = serde_json::from_str(text)?;

    let frame = match (raw.kind.as_str(), raw.envelope_id) {
        ("hello", _) => Frame::Hello,
        ("disconnect", _) => Frame::Disconnect { reason: raw.reason },
        ("events_api", Some(envelope_id)) => {
            let event = raw
                .payload
                .and_then(|mut p| p.get_mut("event").map(serde_json::Value::take))
                .and_then(|e| serde_json::from_value(e).ok());
            Frame::EventsApi { envelope_id, event }
        },
        ("events_api", None) => {
            return Err(Error::Protocol("events_api envelope without id".into()));
        },
        (_, Some(envelope_id)) => Frame::Unrouted {
            envelope_id,
            kind: raw.kind,
        },
        (_, None) => Frame::Other { kind: raw.kind },
    };
    Ok(frame)
}

/// Acknowledgement payload for an envelope.
pub fn ack(envelope_id: &str) -> String {
    serde_json::json!({ "envelope_id": envelope_id }).to_string()
}

pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

fn is_fatal(err: &Error) -> bool {
    err.api_code()
        .is_some_and(|code| FATAL_API_ERRORS.contains(&code))
}

/// How a single connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Cancelled,
    /// Nobody is listening for events any more.
    FeedClosed,
    /// Server asked us to reconnect.
    Refresh,
    /// Socket closed without warning.
    Closed,
}

/// Reconnecting Socket Mode client.
pub struct SocketModeFeed {
    api: SlackApi,
    max_backoff: Duration,
}

impl SocketModeFeed {
    pub fn new(api: SlackApi, max_backoff: Duration) -> Self {
        Self {
            api,
            max_backoff: max_backoff.max(INITIAL_BACKOFF),
        }
    }

    /// Forward events to `events` until `cancel` fires, the receiver is
    /// dropped, or Slack rejects our credentials.
    pub async fn run(&self, events: EventSender, cancel: CancellationToken) -> Result<()> {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match self.session(&events, &cancel).await {
                Ok(SessionEnd::Cancelled | SessionEnd::FeedClosed) => return Ok(()),
                Ok(SessionEnd::Refresh) => {
                    backoff = INITIAL_BACKOFF;
                    continue;
                },
                Ok(SessionEnd::Closed) => {
                    backoff = INITIAL_BACKOFF;
                    debug!("socket closed by server");
                },
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    warn!(error = %e, "socket mode connection failed");
                },
            }

            info!(delay_ms = backoff.as_millis(), "reconnecting after delay");
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(backoff) => {},
            }
            backoff = next_backoff(backoff, self.max_backoff);
        }
    }

    async fn session(
        &self,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd> {
        let url = self.api.open_connection().await?;
        let (ws, _response) = connect_async(url.as_str()).await?;
        let (mut sink, mut stream) = ws.split();

        #[cfg(feature = "metrics")]
        counter!(transport_metrics::CONNECTIONS_TOTAL, labels::TRANSPORT => "slack").increment(1);

        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Cancelled);
                },
                msg = stream.next() => msg,
            };

            let text = match msg {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Ping(data))) => {
                    sink.send(Message::Pong(data)).await?;
                    continue;
                },
                Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            };

            let frame = match parse_frame(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "ignoring malformed socket frame");
                    continue;
                },
            };

            if let Some(envelope_id) = frame.envelope_id() {
                sink.send(Message::Text(ack(envelope_id).into())).await?;
            }

            match frame {
                Frame::Hello => info!("socket mode connected"),
                Frame::Disconnect { reason } => {
                    info!(
                        reason = reason.as_deref().unwrap_or("unknown"),
                        "server requested reconnect"
                    );
                    return Ok(SessionEnd::Refresh);
                },
                Frame::EventsApi {
                    event: Some(event), ..
                } => {
                    let delivered = tokio::select! {
                        _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                        sent = events.send(event) => sent.is_ok(),
                    };
                    if !delivered {
                        return Ok(SessionEnd::FeedClosed);
                    }
                },
                Frame::EventsApi { event: None, .. } => {
                    debug!("skipping unsupported event payload");
                },
                Frame::Unrouted { kind, .. } | Frame::Other { kind } => {
                    debug!(kind = %kind, "ignoring socket frame");
                },
            }
        }
    }
}
