//! Operator error types.

use std::path::PathBuf;

use cadence_hooks::error::BoxedError;
use cadence_hooks::{ScheduleError, TickCounters};

/// Invalid or unreadable operator configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON for [`OperatorConfig`](crate::OperatorConfig).
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field has an unusable value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failure ending [`Operator::run`](crate::Operator::run).
#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    /// Hook resolution failed or an inline hook failed.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// The user training step failed.
    #[error("training step failed at {counters}: {source}")]
    TrainingStep {
        /// Counters of the tick the step was producing.
        counters: TickCounters,
        /// The step's error.
        #[source]
        source: BoxedError,
    },

    /// The operator configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
