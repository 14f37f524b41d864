//! Observability: structured logging and Prometheus metrics.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Initialize logging.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init(service_name: &str, config: &ObservabilityConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logging {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?;
    }

    tracing::debug!(service_name = %service_name, "Logging initialized");
    Ok(())
}

/// Install the Prometheus recorder and describe the crate's metrics.
pub fn install_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    metrics::register_metrics();
    Ok(handle)
}

/// Metrics registry and helpers.
pub mod metrics {
    use metrics::describe_counter;

    /// Register all metric descriptions.
    pub fn register_metrics() {
        describe_counter!(
            "lendit_errors_total",
            "Failures raised while handling requests, by code"
        );
        describe_counter!(
            "lendit_token_refresh_total",
            "Token refresh orchestrator outcomes"
        );
        describe_counter!(
            "lendit_authorization_decisions_total",
            "Authorization decisions, by verdict"
        );
        describe_counter!(
            "lendit_auth_total",
            "Bearer token verification results"
        );
    }
}
