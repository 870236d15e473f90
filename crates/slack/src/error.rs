pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Slack answered with `"ok": false`.
    #[error("{method} failed: {error}")]
    Api { method: String, error: String },

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl Error {
    #[must_use]
    pub fn api(method: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Api {
            method: method.into(),
            error: error.into(),
        }
    }

    /// Error code reported by Slack, if this is an API error.
    pub fn api_code(&self) -> Option<&str> {
        match self {
            Self::Api { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<Error> for synebot_channels::Error {
    fn from(err: Error) -> Self {
        synebot_channels::Error::external("slack", err)
    }
}
