mod config_commands;
mod hello;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context as _,
    clap::{Parser, Subcommand},
    synebot_config::SynebotConfig,
    synebot_routing::{BotRuntime, ContextLimits, HandlerRegistry},
    synebot_slack::SlackTransport,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "synebot", about = "Synebot, a conversational Slack bot", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: ./synebot.toml, then ~/.config/synebot/).
    #[arg(long, global = true, env = "SYNEBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Connect to Slack and start answering (default).
    Run,
    /// Validate the configuration and report errors/warnings.
    CheckConfig,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load config from `path`, or discover it, then apply environment overrides.
pub(crate) fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<SynebotConfig> {
    let config = match path {
        Some(path) => synebot_config::load_from_env(synebot_config::load_config(path)?),
        None => synebot_config::discover_and_load()?,
    };
    Ok(config)
}

#[cfg(feature = "metrics")]
fn metrics_recorder_config(
    config: &synebot_config::MetricsConfig,
) -> anyhow::Result<synebot_metrics::MetricsRecorderConfig> {
    let listen_addr = config
        .listen_addr
        .parse()
        .with_context(|| format!("invalid metrics.listen_addr {:?}", config.listen_addr))?;
    Ok(synebot_metrics::MetricsRecorderConfig {
        enabled: config.enabled,
        listen_addr: Some(listen_addr),
        global_labels: config
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    })
}

fn handlers() -> anyhow::Result<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    registry.register(hello::SLOT, hello::HelloHandler)?;
    Ok(registry)
}

async fn run(config: SynebotConfig) -> anyhow::Result<()> {
    let diagnostics = synebot_config::validate(&config)
        .into_result()
        .context("invalid configuration")?;
    for d in diagnostics {
        warn!(path = d.path, "{}", d.message);
    }

    // Both ring and aws-lc may be linked in; pick one explicitly.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider already installed");
    }

    #[cfg(feature = "metrics")]
    let _metrics = if config.metrics.enabled {
        synebot_metrics::init_metrics(metrics_recorder_config(&config.metrics)?)?
    } else {
        synebot_metrics::MetricsHandle::default()
    };

    let transport = Arc::new(SlackTransport::from_config(&config.slack));
    let limits = ContextLimits {
        max_history: config.contexts.max_history,
        idle_timeout: config.contexts.idle_timeout(),
    };
    let runtime = BotRuntime::new(transport, config.name.clone(), handlers()?)
        .with_limits(limits)
        .with_sweep_interval(config.contexts.sweep_interval());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
            }
            cancel.cancel();
        });
    }

    info!(name = %config.name, "synebot starting");
    runtime.run(cancel).await?;
    info!("synebot stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(load_config(cli.config.as_deref())?).await,
        Commands::CheckConfig => config_commands::check(cli.config.as_deref()),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(&["synebot"], None)]
    #[case(&["synebot", "run"], Some(Commands::Run))]
    #[case(&["synebot", "check-config"], Some(Commands::CheckConfig))]
    fn parses_subcommands(#[case] args: &[&str], #[case] expected: Option<Commands>) {
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.command, expected);
        assert_eq!(cli.log_level, "info");
        assert!(!cli.json_logs);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "synebot",
            "run",
            "--config",
            "bot.toml",
            "--log-level",
            "debug",
            "--json-logs",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("bot.toml")));
        assert_eq!(cli.log_level, "debug");
        assert!(cli.json_logs);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn metrics_config_maps_to_recorder() {
        let mut config = synebot_config::MetricsConfig::default();
        config.labels.insert("instance".into(), "bot-1".into());

        let recorder = metrics_recorder_config(&config).unwrap();
        assert!(recorder.enabled);
        assert_eq!(
            recorder.listen_addr,
            Some(synebot_config::DEFAULT_METRICS_ADDR.parse().unwrap())
        );
        assert_eq!(recorder.global_labels, vec![(
            "instance".to_string(),
            "bot-1".to_string()
        )]);

        config.listen_addr = "nowhere".into();
        assert!(metrics_recorder_config(&config).is_err());
    }

    #[test]
    fn default_handlers_registered() {
        let registry = handlers().unwrap();
        assert_eq!(registry.slots(), vec![hello::SLOT]);
    }
}
