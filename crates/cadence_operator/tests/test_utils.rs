//! Shared test utilities for `cadence_operator` integration tests.
//!
//! Import via `mod test_utils;` in test files.

#![allow(
    dead_code,
    missing_docs,
    reason = "shared test utilities, not all items used in every test binary"
)]

use std::sync::Arc;

use cadence_hooks::TickCounters;
use cadence_operator::OperatorConfig;
use cadence_registry::{ParameterRegistry, RegistryError};
use parking_lot::Mutex;

/// Config for `epochs` epochs of `iterations` iterations.
pub fn config(epochs: u64, iterations: u64) -> OperatorConfig {
    OperatorConfig::default()
        .with_max_epochs(Some(epochs))
        .with_iterations_per_epoch(iterations)
}

/// A training step writing a decreasing loss and recording the counters it
/// was called with.
pub fn recording_step(
    seen: &Arc<Mutex<Vec<TickCounters>>>,
) -> impl FnMut(&mut ParameterRegistry, TickCounters) -> Result<(), RegistryError> + use<> {
    let seen = Arc::clone(seen);
    move |registry, counters| {
        seen.lock().push(counters);
        registry
            .set("metrics.loss", 1.0 / (counters.iteration as f64))
            .map(drop)
    }
}

/// A training step that does nothing.
pub fn idle_step(_: &mut ParameterRegistry, _: TickCounters) -> Result<(), RegistryError> {
    Ok(())
}
