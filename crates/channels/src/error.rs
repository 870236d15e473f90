use std::error::Error as StdError;

/// Crate-wide result type for channel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors shared by transports and the bot bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configured bot name does not match any user in the directory.
    #[error("bot user \"{name}\" not found in the user directory")]
    UnknownBotUser { name: String },

    /// Transport is not connected or not configured.
    #[error("transport unavailable: {message}")]
    Unavailable { message: String },

    /// Wrapped source error from the platform integration.
    #[error("transport operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn unknown_bot_user(name: impl std::fmt::Display) -> Self {
        Self::UnknownBotUser {
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
