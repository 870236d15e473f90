//! Recorder installation and the Prometheus scrape endpoint.

use std::net::SocketAddr;

use {anyhow::Result, tracing::info};

/// Handle to the installed recorder.
#[derive(Clone, Default)]
pub struct MetricsHandle {
    #[cfg(feature = "prometheus")]
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl MetricsHandle {
    /// Current metrics in Prometheus text format; empty when disabled.
    #[must_use]
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.prometheus_handle
                .as_ref()
                .map(|h| h.render())
                .unwrap_or_default()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    pub enabled: bool,
    /// Where to serve `/metrics`. `None` records without serving.
    pub listen_addr: Option<SocketAddr>,
    /// Labels added to every metric.
    pub global_labels: Vec<(String, String)>,
}

/// Install the global recorder.
///
/// Call once at startup, from inside the tokio runtime: the scrape endpoint
/// runs as a spawned task. Without the `prometheus` feature every metric
/// stays a no-op.
///
/// # Errors
///
/// Fails if the exporter cannot be built (e.g. the listen address is taken)
/// or a recorder is already installed.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<MetricsHandle> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(MetricsHandle::default());
    }

    #[cfg(feature = "prometheus")]
    {
        let listen_addr = config.listen_addr;
        let handle = install_prometheus(config)?;
        match listen_addr {
            Some(addr) => info!(%addr, "prometheus exporter listening"),
            None => info!("prometheus recorder installed without endpoint"),
        }
        Ok(MetricsHandle {
            prometheus_handle: Some(handle),
        })
    }

    #[cfg(not(feature = "prometheus"))]
    {
        info!("metrics feature not enabled at compile time");
        Ok(MetricsHandle::default())
    }
}

#[cfg(feature = "prometheus")]
fn builder(config: MetricsRecorderConfig) -> metrics_exporter_prometheus::PrometheusBuilder {
    let mut builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Some(addr) = config.listen_addr {
        builder = builder.with_http_listener(addr);
    }
    for (key, value) in config.global_labels {
        builder = builder.add_global_label(key, value);
    }
    builder
}

#[cfg(feature = "prometheus")]
fn install_prometheus(
    config: MetricsRecorderConfig,
) -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    if config.listen_addr.is_none() {
        return Ok(builder(config).install_recorder()?);
    }

    let (recorder, exporter) = builder(config).build()?;
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|_| anyhow::anyhow!("a metrics recorder is already installed"))?;
    tokio::spawn(async move {
        if let Err(e) = exporter.await {
            tracing::warn!(error = ?e, "prometheus exporter stopped");
        }
    });
    Ok(handle)
}
