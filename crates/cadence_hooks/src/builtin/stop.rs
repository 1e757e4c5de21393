//! Stop training at a fixed point.

use crate::context::HookContext;
use crate::error::HookError;
use crate::hook::Hook;
use crate::time_step::TimeStep;

/// Signals [`HookSignal::StopTraining`](crate::HookSignal::StopTraining) when
/// its time step comes due.
///
/// Fires once unless the time step carries its own live time.
#[derive(Debug, Clone)]
pub struct StopTrainingHook {
    name: String,
    time_step: TimeStep,
    reason: String,
}

impl StopTrainingHook {
    /// Stops at the first tick `time_step` is due.
    #[must_use]
    pub fn new(time_step: TimeStep) -> Self {
        let time_step = match time_step.live_time() {
            Some(_) => time_step,
            None => time_step.with_live_time(1),
        };
        Self {
            name: "stop_training".to_string(),
            reason: format!("stop scheduled {time_step}"),
            time_step,
        }
    }

    /// Stops at the end of epoch `epochs`.
    #[must_use]
    pub fn after_epochs(epochs: u64) -> Self {
        Self::new(TimeStep::every_epochs(epochs)).with_reason(format!("reached {epochs} epochs"))
    }

    /// Stops after `iterations` iterations.
    #[must_use]
    pub fn after_iterations(iterations: u64) -> Self {
        Self::new(TimeStep::every_iterations(iterations))
            .with_reason(format!("reached {iterations} iterations"))
    }

    /// Sets the reason reported with the signal.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Sets the hook name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Hook for StopTrainingHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn time_step(&self) -> TimeStep {
        self.time_step
    }

    fn invoke(&self, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        tracing::info!(hook = %self.name, counters = %ctx.counters(), reason = %self.reason, "requesting stop");
        ctx.stop_training(self.reason.clone());
        Ok(())
    }

    fn functionally_equals(&self, other: &dyn Hook) -> bool {
        other
            .downcast_ref::<StopTrainingHook>()
            .is_some_and(|other| self.time_step == other.time_step && self.reason == other.reason)
    }
}
