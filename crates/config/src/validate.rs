//! Configuration checks run before the bot connects.

use secrecy::ExposeSecret;

use crate::{Error, Result, schema::SynebotConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "slack.bot_token"
    pub path: &'static str,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.path, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// Turn error diagnostics into an [`Error::Invalid`].
    pub fn into_result(self) -> Result<Vec<Diagnostic>> {
        if self.has_errors() {
            return Err(Error::Invalid {
                messages: self
                    .diagnostics
                    .iter()
                    .filter(|d| d.severity == Severity::Error)
                    .map(|d| format!("{}: {}", d.path, d.message))
                    .collect(),
            });
        }
        Ok(self.diagnostics)
    }

    fn push(&mut self, severity: Severity, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path,
            message: message.into(),
        });
    }
}

/// Check a loaded configuration.
///
/// Missing credentials and an empty bot name are errors: the bot cannot
/// connect or recognise itself without them.
pub fn validate(config: &SynebotConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.name.trim().is_empty() {
        result.push(Severity::Error, "name", "bot name must not be empty");
    }

    let bot_token = config.slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        result.push(
            Severity::Error,
            "slack.bot_token",
            "missing bot token (set BOT_API_KEY or slack.bot_token)",
        );
    } else if !bot_token.starts_with("xoxb-") {
        result.push(
            Severity::Warning,
            "slack.bot_token",
            "bot tokens usually start with \"xoxb-\"",
        );
    }

    let app_token = config.slack.app_token.expose_secret();
    if app_token.is_empty() {
        result.push(
            Severity::Error,
            "slack.app_token",
            "missing app-level token (set SLACK_APP_TOKEN or slack.app_token)",
        );
    } else if !app_token.starts_with("xapp-") {
        result.push(
            Severity::Warning,
            "slack.app_token",
            "app-level tokens usually start with \"xapp-\"",
        );
    }

    if !config.slack.api_base_url.starts_with("http") {
        result.push(
            Severity::Error,
            "slack.api_base_url",
            format!("not an http(s) URL: {}", config.slack.api_base_url),
        );
    }

    if config.contexts.max_history == 0 {
        result.push(
            Severity::Warning,
            "contexts.max_history",
            "conversation history is unbounded",
        );
    }
    if config.contexts.idle_timeout_secs == 0 {
        result.push(
            Severity::Warning,
            "contexts.idle_timeout_secs",
            "idle conversations are never dropped",
        );
    }

    if config.metrics.enabled
        && config
            .metrics
            .listen_addr
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        result.push(
            Severity::Error,
            "metrics.listen_addr",
            format!("not a socket address: {}", config.metrics.listen_addr),
        );
    }

    result
}
