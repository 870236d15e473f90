use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, info},
};

use crate::{Error, Result, env_subst::substitute_env, schema::SynebotConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "synebot.toml",
    "synebot.yaml",
    "synebot.yml",
    "synebot.json",
];

/// Bot token for Web API calls.
pub const ENV_BOT_TOKEN: &str = "BOT_API_KEY";
/// Bot user name.
pub const ENV_BOT_NAME: &str = "BOT_NAME";
/// App-level token for Socket Mode.
pub const ENV_APP_TOKEN: &str = "SLACK_APP_TOKEN";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<SynebotConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&substitute_env(&raw), path)
}

fn parse_config(raw: &str, path: &Path) -> Result<SynebotConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse(path, e)),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}

/// Discover and load config from standard locations, then apply environment
/// overrides.
///
/// Search order:
/// 1. `./synebot.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/synebot/synebot.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to defaults when no file exists. A file that exists but does
/// not parse is an error.
pub fn discover_and_load() -> Result<SynebotConfig> {
    let config = match find_config_file() {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            load_config(&path)?
        },
        None => {
            debug!("no config file found, using defaults");
            SynebotConfig::default()
        },
    };
    Ok(load_from_env(config))
}

/// Apply overrides from the process environment.
pub fn load_from_env(config: SynebotConfig) -> SynebotConfig {
    apply_env_overrides(config, |name| std::env::var(name).ok())
}

/// Apply `BOT_API_KEY`, `BOT_NAME` and `SLACK_APP_TOKEN` on top of `config`.
/// Empty values are ignored.
pub fn apply_env_overrides(
    mut config: SynebotConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> SynebotConfig {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(token) = get(ENV_BOT_TOKEN) {
        debug!(var = ENV_BOT_TOKEN, "bot token set from environment");
        config.slack.bot_token = Secret::new(token);
    }
    if let Some(token) = get(ENV_APP_TOKEN) {
        debug!(var = ENV_APP_TOKEN, "app token set from environment");
        config.slack.app_token = Secret::new(token);
    }
    if let Some(name) = get(ENV_BOT_NAME) {
        config.name = name;
    }
    config
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .or_else(|| {
            let dir = config_dir()?;
            CONFIG_FILENAMES
                .iter()
                .map(|name| dir.join(name))
                .find(|p| p.exists())
        })
}

/// Returns the user-global config directory (`~/.config/synebot/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "synebot").map(|d| d.config_dir().to_path_buf())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret, std::io::Write};

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "synebot.toml",
            "name = \"helper\"\n[slack]\nbot_token = \"xoxb-1\"\napp_token = \"xapp-1\"\n",
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.name, "helper");
        assert_eq!(cfg.slack.bot_token.expose_secret(), "xoxb-1");
        assert_eq!(cfg.slack.app_token.expose_secret(), "xapp-1");
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = write_file(&dir, "synebot.yaml", "name: yambot\ncontexts:\n  max_history: 5\n");
        let cfg = load_config(&yaml).unwrap();
        assert_eq!(cfg.name, "yambot");
        assert_eq!(cfg.contexts.max_history, 5);

        let json = write_file(&dir, "synebot.json", r#"{"name": "jsonbot"}"#);
        assert_eq!(load_config(&json).unwrap().name, "jsonbot");
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "synebot.ini", "name=x");
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat { ref extension }) if extension == "ini"
        ));
    }

    #[test]
    fn reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "synebot.toml", "name = [");
        assert!(matches!(load_config(&path), Err(Error::Parse { .. })));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load_config(Path::new("/definitely/not/here/synebot.toml")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn env_overrides_file_values() {
        let lookup = |name: &str| match name {
            "BOT_API_KEY" => Some("xoxb-env".to_string()),
            "BOT_NAME" => Some("envbot".to_string()),
            "SLACK_APP_TOKEN" => Some("   ".to_string()),
            _ => None,
        };
        let mut base = SynebotConfig::default();
        base.slack.app_token = Secret::new("xapp-file".into());

        let cfg = apply_env_overrides(base, lookup);
        assert_eq!(cfg.slack.bot_token.expose_secret(), "xoxb-env");
        assert_eq!(cfg.name, "envbot");
        // Blank values do not clobber the file.
        assert_eq!(cfg.slack.app_token.expose_secret(), "xapp-file");
    }
}
