//! Tracing setup
//!
//! Library code only emits `tracing` events. Binaries and tests that want to
//! see them can install a subscriber with [`init_tracing`].
//!
//! Targets used by this crate:
//! - `callflux::adapter` - declared return types resolved to adapters
//! - `callflux::bridge` - call start, suppressed callbacks, disposal
//! - `callflux::body` - body projection decisions
//! - `callflux::scheduler` - scheduled subscriptions
//! - `callflux::flux` - signals dropped after cancellation
//! - `callflux::http` - HTTP call lifecycle
//! - `callflux::fault` - faults from the default reporter

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::CallError;

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Subscriber configuration for [`init_tracing`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Default level when `RUST_LOG` and `env_filter` are unset.
    pub level: String,
    pub format: OutputFormat,
    /// Include the event target in each line.
    pub with_target: bool,
    /// Explicit filter directives, e.g. `callflux::bridge=trace`.
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: OutputFormat::Pretty,
            with_target: true,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    pub fn builder() -> TracingConfigBuilder {
        TracingConfigBuilder::default()
    }

    /// Filter resolved from, in order: explicit directives, `RUST_LOG`, `level`.
    fn filter(&self) -> Result<EnvFilter, CallError> {
        if let Some(directives) = &self.env_filter {
            return EnvFilter::try_new(directives)
                .map_err(|e| CallError::ConfigurationError(format!("invalid filter: {e}")));
        }
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| CallError::ConfigurationError(format!("invalid level: {e}")))
    }
}

/// Builder for [`TracingConfig`].
#[derive(Debug, Clone, Default)]
pub struct TracingConfigBuilder {
    config: TracingConfig,
}

impl TracingConfigBuilder {
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn with_target(mut self, with_target: bool) -> Self {
        self.config.with_target = with_target;
        self
    }

    pub fn env_filter(mut self, directives: impl Into<String>) -> Self {
        self.config.env_filter = Some(directives.into());
        self
    }

    pub fn build(self) -> TracingConfig {
        self.config
    }
}

/// Install a global `tracing` subscriber.
///
/// Fails with [`CallError::ConfigurationError`] when the filter is invalid or
/// a global subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<(), CallError> {
    let filter = config.filter()?;
    let registry = tracing_subscriber::registry().with(filter);
    let fmt = tracing_subscriber::fmt::layer().with_target(config.with_target);
    let result = match config.format {
        OutputFormat::Pretty => registry.with(fmt.pretty()).try_init(),
        OutputFormat::Compact => registry.with(fmt.compact()).try_init(),
        OutputFormat::Json => registry.with(fmt.json()).try_init(),
    };
    result.map_err(|e| CallError::ConfigurationError(format!("tracing already initialized: {e}")))
}
