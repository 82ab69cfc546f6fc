//! Structured logging initialization
//!
//! Installs a `tracing` subscriber with JSON output and an `EnvFilter`
//! honoring `RUST_LOG`. Whatever process hosts the engine calls this once.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Logging setup failure
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed, or installing it failed
    #[error("tracing subscriber already set or unusable: {0}")]
    SubscriberInit(String),
}

/// Log output settings for the hosting process
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "stratus".to_string(),
            default_filter: "info,stratus=debug,kube=info,tower=warn,hyper=warn".to_string(),
            json: true,
        }
    }
}

impl TelemetryConfig {
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// Initialize the global tracing subscriber
///
/// # Example
///
/// ```ignore
/// use stratus_common::telemetry::{init_telemetry, TelemetryConfig};
///
/// init_telemetry(TelemetryConfig::default())?;
/// ```
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = config.env_filter();

    let (json_layer, text_layer) = if config.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_file(false)
            .with_line_number(false);
        (Some(layer), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer().with_target(true)))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::SubscriberInit(e.to_string())
        })?;

    tracing::info!(service = %config.service_name, "Telemetry initialized");
    Ok(())
}
