//! Configuration loading, env substitution, and validation.
//!
//! Config files: `synebot.toml`, `synebot.yaml`, `synebot.yml` or
//! `synebot.json`, searched in `./` then `~/.config/synebot/`.
//!
//! Supports `${ENV_VAR}` substitution in the raw file, and the
//! environment variables (`BOT_API_KEY`, `BOT_NAME`, `SLACK_APP_TOKEN`)
//! override whatever the file says.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        apply_env_overrides, config_dir, discover_and_load, find_config_file, load_config,
        load_from_env,
    },
    schema::{
        ContextsConfig, DEFAULT_BOT_NAME, DEFAULT_METRICS_ADDR, MetricsConfig, SlackConfig,
        SynebotConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
