use std::{collections::BTreeMap, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Bot user name used when none is configured.
pub const DEFAULT_BOT_NAME: &str = "synebot";

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynebotConfig {
    /// Name of the bot's user in the workspace directory.
    pub name: String,
    pub slack: SlackConfig,
    pub contexts: ContextsConfig,
    pub metrics: MetricsConfig,
}

impl Default for SynebotConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_BOT_NAME.into(),
            slack: SlackConfig::default(),
            contexts: ContextsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Slack connection settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    /// Bot token (`xoxb-…`) used for Web API calls.
    #[serde(serialize_with = "serialize_redacted")]
    pub bot_token: Secret<String>,

    /// App-level token (`xapp-…`) used to open Socket Mode connections.
    #[serde(serialize_with = "serialize_redacted")]
    pub app_token: Secret<String>,

    /// Web API base URL.
    pub api_base_url: String,

    /// Upper bound for the reconnect backoff (seconds).
    pub max_reconnect_backoff_secs: u64,
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &"[REDACTED]")
            .field("app_token", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .finish_non_exhaustive()
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: Secret::new(String::new()),
            app_token: Secret::new(String::new()),
            api_base_url: "https://slack.com/api".into(),
            max_reconnect_backoff_secs: 30,
        }
    }
}

impl SlackConfig {
    pub fn max_reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.max_reconnect_backoff_secs.max(1))
    }
}

/// Limits on in-memory conversation context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContextsConfig {
    /// Events kept per conversation. `0` keeps all of them.
    pub max_history: usize,
    /// Drop a conversation after this many idle seconds. `0` never drops.
    pub idle_timeout_secs: u64,
    /// How often idle conversations are swept (seconds).
    pub sweep_interval_secs: u64,
}

impl Default for ContextsConfig {
    fn default() -> Self {
        Self {
            max_history: 50,
            idle_timeout_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

impl ContextsConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Address the `/metrics` scrape endpoint listens on.
    pub listen_addr: String,
    /// Labels added to every metric.
    pub labels: BTreeMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: DEFAULT_METRICS_ADDR.into(),
            labels: BTreeMap::new(),
        }
    }
}

/// Loopback only, so a default install never exposes metrics publicly.
pub const DEFAULT_METRICS_ADDR: &str = "127.0.0.1:9464";

fn serialize_redacted<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    if secret.expose_secret().is_empty() {
        serializer.serialize_str("")
    } else {
        serializer.serialize_str("[REDACTED]")
    }
}
