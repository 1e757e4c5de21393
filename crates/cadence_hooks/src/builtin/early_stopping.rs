//! Stop training when a metric stops improving.

use parking_lot::Mutex;

use super::read_number;
use crate::context::HookContext;
use crate::error::HookError;
use crate::hook::Hook;
use crate::time_step::TimeStep;

/// Direction in which a watched metric improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopMode {
    /// Lower is better (losses).
    #[default]
    Minimize,
    /// Higher is better (accuracies).
    Maximize,
}

#[derive(Debug, Default)]
struct Progress {
    best: Option<f64>,
    stale: u64,
    triggered: bool,
}

/// Inline hook signalling a stop after `patience` evaluations without an
/// improvement of more than `min_delta`.
///
/// Evaluates at the end of every epoch unless configured otherwise. Once it
/// has signalled, further evaluations are no-ops.
#[derive(Debug)]
pub struct EarlyStopping {
    name: String,
    metric: Vec<String>,
    patience: u64,
    min_delta: f64,
    mode: StopMode,
    time_step: TimeStep,
    progress: Mutex<Progress>,
}

impl EarlyStopping {
    /// Watches `metric`, stopping after `patience` stale evaluations.
    #[must_use]
    pub fn new(metric: impl Into<String>, patience: u64) -> Self {
        let metric = metric.into();
        Self {
            name: format!("early_stopping({metric})"),
            metric: vec![metric],
            patience: patience.max(1),
            min_delta: 0.0,
            mode: StopMode::Minimize,
            time_step: TimeStep::every_epoch(),
            progress: Mutex::new(Progress::default()),
        }
    }

    /// Minimum change counted as an improvement.
    #[must_use]
    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta.abs();
        self
    }

    /// Sets the improvement direction.
    #[must_use]
    pub fn with_mode(mut self, mode: StopMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets when the metric is evaluated.
    #[must_use]
    pub fn with_time_step(mut self, time_step: TimeStep) -> Self {
        self.time_step = time_step;
        self
    }

    /// Best value seen so far.
    #[must_use]
    pub fn best(&self) -> Option<f64> {
        self.progress.lock().best
    }

    /// Evaluations since the last improvement.
    #[must_use]
    pub fn stale_evaluations(&self) -> u64 {
        self.progress.lock().stale
    }

    fn improves(&self, value: f64, best: f64) -> bool {
        match self.mode {
            StopMode::Minimize => value < best - self.min_delta,
            StopMode::Maximize => value > best + self.min_delta,
        }
    }
}

impl Hook for EarlyStopping {
    fn name(&self) -> &str {
        &self.name
    }

    fn time_step(&self) -> TimeStep {
        self.time_step
    }

    fn required_registry_entries(&self) -> &[String] {
        &self.metric
    }

    fn invoke(&self, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        let value = read_number(ctx, &self.metric[0])?;
        let mut progress = self.progress.lock();
        if progress.triggered {
            return Ok(());
        }

        if progress.best.is_none_or(|best| self.improves(value, best)) {
            progress.best = Some(value);
            progress.stale = 0;
            return Ok(());
        }

        progress.stale += 1;
        tracing::debug!(hook = %self.name, value, stale = progress.stale, patience = self.patience, "no improvement");
        if progress.stale >= self.patience {
            progress.triggered = true;
            let best = progress.best.unwrap_or(value);
            tracing::info!(hook = %self.name, best, counters = %ctx.counters(), "early stopping triggered");
            ctx.stop_training(format!(
                "{} did not improve on {best} for {} evaluations",
                self.metric[0], self.patience
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cadence_registry::ParameterRegistry;
    use tokio::sync::mpsc;

    use super::*;
    use crate::context::HookSignal;
    use crate::registration::OperatorId;
    use crate::time_step::TickCounters;

    fn evaluate(
        hook: &EarlyStopping,
        epoch: u64,
        value: f64,
    ) -> Option<HookSignal> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = ParameterRegistry::new();
        registry.set("metrics.val_loss", value).unwrap();
        let mut ctx = HookContext::inline(&mut registry, hook.name(), TickCounters::at_epoch_end(epoch, epoch * 10), OperatorId::new(0))
            .with_signals(Some(tx));
        hook.invoke(&mut ctx).unwrap();
        rx.try_recv().ok().map(|envelope| envelope.signal)
    }

    #[test]
    fn stops_after_patience_runs_out() {
        let hook = EarlyStopping::new("metrics.val_loss", 2);

        assert_eq!(evaluate(&hook, 1, 1.0), None);
        assert_eq!(evaluate(&hook, 2, 0.8), None);
        assert_eq!(evaluate(&hook, 3, 0.9), None);
        assert_eq!(hook.stale_evaluations(), 1);
        assert!(matches!(
            evaluate(&hook, 4, 0.85),
            Some(HookSignal::StopTraining { .. })
        ));
        assert_eq!(hook.best(), Some(0.8));

        assert_eq!(evaluate(&hook, 5, 2.0), None);
    }

    #[test]
    fn min_delta_ignores_tiny_improvements() {
        let hook = EarlyStopping::new("metrics.val_loss", 1).with_min_delta(0.1);

        assert_eq!(evaluate(&hook, 1, 1.0), None);
        assert!(evaluate(&hook, 2, 0.95).is_some());
    }

    #[test]
    fn maximize_mode_tracks_highest_value() {
        let hook = EarlyStopping::new("metrics.val_loss", 1).with_mode(StopMode::Maximize);

        assert_eq!(evaluate(&hook, 1, 0.5), None);
        assert_eq!(evaluate(&hook, 2, 0.7), None);
        assert_eq!(hook.best(), Some(0.7));
        assert!(evaluate(&hook, 3, 0.6).is_some());
    }

    #[test]
    fn instances_are_only_equal_to_themselves() {
        let a = EarlyStopping::new("metrics.val_loss", 3);
        let b = EarlyStopping::new("metrics.val_loss", 3);
        assert!(a.functionally_equals(&a));
        assert!(!a.functionally_equals(&b));
    }
}
