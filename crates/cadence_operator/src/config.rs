//! Operator configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tracing_setup::TracingConfig;

/// Settings of a training run.
///
/// # Example
///
/// ```
/// use cadence_operator::OperatorConfig;
///
/// let config = OperatorConfig::from_json_str(
///     r#"{"max_epochs": 3, "iterations_per_epoch": 100, "tracing": {"level": "debug"}}"#,
/// )
/// .unwrap();
/// assert_eq!(config.max_epochs, Some(3));
/// assert!(config.drain_on_stop);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Number of epochs to train; `None` trains until a hook or the stop handle
    /// ends the run.
    pub max_epochs: Option<u64>,
    /// Iterations per epoch; must be at least 1.
    pub iterations_per_epoch: u64,
    /// Whether [`Operator::run`](crate::Operator::run) waits for in-flight
    /// background hooks before returning.
    pub drain_on_stop: bool,
    /// Tracing subscriber settings.
    pub tracing: TracingConfig,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            max_epochs: Some(1),
            iterations_per_epoch: 1,
            drain_on_stop: true,
            tracing: TracingConfig::default(),
        }
    }
}

impl OperatorConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Invalid`] for unusable values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_json_str`](Self::from_json_str).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Checks that the configuration can drive a run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations_per_epoch == 0 {
            return Err(ConfigError::Invalid(
                "iterations_per_epoch must be at least 1".to_string(),
            ));
        }
        if self.max_epochs == Some(0) {
            return Err(ConfigError::Invalid("max_epochs must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Sets the number of epochs; `None` trains until stopped.
    #[must_use]
    pub fn with_max_epochs(mut self, max_epochs: Option<u64>) -> Self {
        self.max_epochs = max_epochs;
        self
    }

    /// Sets the number of iterations per epoch.
    #[must_use]
    pub fn with_iterations_per_epoch(mut self, iterations: u64) -> Self {
        self.iterations_per_epoch = iterations;
        self
    }

    /// Sets whether the run waits for background hooks before returning.
    #[must_use]
    pub fn with_drain_on_stop(mut self, drain: bool) -> Self {
        self.drain_on_stop = drain;
        self
    }

    /// Sets the tracing configuration.
    #[must_use]
    pub fn with_tracing(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracing_setup::TracingFormat;

    #[test]
    fn empty_json_gives_defaults() {
        assert_eq!(OperatorConfig::from_json_str("{}").unwrap(), OperatorConfig::default());
    }

    #[test]
    fn nested_tracing_section_is_parsed() {
        let config = OperatorConfig::from_json_str(
            r#"{"max_epochs": null, "iterations_per_epoch": 10, "drain_on_stop": false,
                "tracing": {"format": "json", "span_events": true}}"#,
        )
        .unwrap();

        assert_eq!(config.max_epochs, None);
        assert_eq!(config.iterations_per_epoch, 10);
        assert!(!config.drain_on_stop);
        assert_eq!(config.tracing.format, TracingFormat::Json);
        assert!(config.tracing.span_events);
    }

    #[test]
    fn zero_iterations_are_rejected() {
        assert!(matches!(
            OperatorConfig::from_json_str(r#"{"iterations_per_epoch": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(OperatorConfig::default().with_max_epochs(Some(0)).validate().is_err());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            OperatorConfig::from_json_str("{\"max_epochs\": \"three\"}"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = OperatorConfig::from_json_file("/nonexistent/cadence.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/cadence.json"));
    }
}
