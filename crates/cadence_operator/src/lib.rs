//! Training operator loop for Cadence (Layer 3).
//!
//! The operator owns the parameter registry and the hook scheduler, advances
//! the tick counters while calling a user-supplied training step, and reacts
//! to what hooks report back:
//!
//! - [`Operator`] - the training loop
//! - [`OperatorConfig`] - run settings, loadable from JSON
//! - [`TracingConfig`] / [`init_tracing`] - subscriber setup
//! - [`StopHandle`] - stopping a run from another task
//! - [`TrainingSummary`] - what a finished run reports
//!
//! # Architecture
//!
//! - **Layer 1** (`cadence_registry`): parameter storage
//! - **Layer 2** (`cadence_hooks`): hook contract, resolver and scheduler
//! - **Layer 3** (`cadence_operator`): the training operator loop (this crate)

/// Operator configuration.
pub mod config;

/// Operator error types.
pub mod error;

/// The training loop.
pub mod operator;

/// Tracing subscriber setup.
pub mod tracing_setup;

pub use config::OperatorConfig;
pub use error::{ConfigError, OperatorError};
pub use operator::{EventObserver, Operator, StopHandle, StopReason, TrainingSummary};
pub use tracing_setup::{TracingConfig, TracingFormat, init_tracing};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::config::OperatorConfig;
    pub use crate::error::{ConfigError, OperatorError};
    pub use crate::operator::{Operator, StopHandle, StopReason, TrainingSummary};
    pub use crate::tracing_setup::{TracingConfig, TracingFormat, init_tracing};
}
