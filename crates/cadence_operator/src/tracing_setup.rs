//! Tracing subscriber setup.
//!
//! [`init_tracing`] installs a global `tracing` subscriber from a
//! [`TracingConfig`]. Installing twice is harmless: the second call leaves the
//! existing subscriber in place.
//!
//! # Example
//!
//! ```
//! use cadence_operator::{TracingConfig, TracingFormat, init_tracing};
//! use tracing::Level;
//!
//! init_tracing(
//!     &TracingConfig::default()
//!         .with_level(Level::DEBUG)
//!         .with_format(TracingFormat::Compact)
//!         .with_env_filter("cadence_hooks=debug,cadence_operator=info"),
//! );
//! tracing::info!("training started");
//! ```

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ─────────────────────────────────────────────────────────────────────────────
// TracingFormat
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracingFormat {
    /// Human-readable colored output (default).
    #[default]
    Pretty,
    /// Compact single-line output.
    Compact,
    /// JSON structured output for log aggregation.
    Json,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing configuration.
///
/// Deserialises from JSON such as
/// `{"level": "debug", "format": "json", "env_filter": "cadence_hooks=trace"}`;
/// every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Maximum log level, used when no env filter is set or it fails to parse.
    #[serde(with = "level_name")]
    pub level: Level,
    /// Output format.
    pub format: TracingFormat,
    /// Target-specific filter (e.g., `"cadence_hooks=debug,cadence_operator=info"`).
    pub env_filter: Option<String>,
    /// Whether to include span enter/exit events.
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingFormat::Pretty,
            env_filter: None,
            span_events: false,
        }
    }
}

impl TracingConfig {
    /// Sets the maximum log level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets a custom environment filter string.
    ///
    /// Format: `target=level,target=level,...`
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Enables span enter/exit events in output.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    fn filter(&self) -> EnvFilter {
        match &self.env_filter {
            Some(filter) => {
                EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
            }
            None => EnvFilter::new(self.level.as_str()),
        }
    }
}

/// Installs the global subscriber described by `config`.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) {
    let env_filter = config.filter();
    let span_events = if config.span_events {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };

    // try_init().ok() ignores errors if already initialized
    let installed = match config.format {
        TracingFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_span_events(span_events),
            )
            .try_init()
            .is_ok(),
        TracingFormat::Compact => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_span_events(span_events),
            )
            .try_init()
            .is_ok(),
        TracingFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(span_events),
            )
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::info!(level = %config.level, format = ?config.format, "tracing initialized");
    }
}

mod level_name {
    use core::str::FromStr;

    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::Level;

    pub(super) fn serialize<S: Serializer>(level: &Level, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&level.as_str().to_ascii_lowercase())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Level, D::Error> {
        let name = String::deserialize(deserializer)?;
        Level::from_str(&name).map_err(serde::de::Error::custom)
    }
}
