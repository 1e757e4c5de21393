//! Running means of numeric registry values.
//!
//! A [`NumberAccumulator`] adds a numeric value to a running sum every
//! iteration and stores it under [`ACCUMULATOR_ROOT`]. An
//! [`AccumulatedValueReporter`] requires one accumulator per value and reports
//! the mean of the window since its previous report. Reporters watching the
//! same value with the same cadence share a single accumulator after
//! resolution.

use core::fmt;
use std::sync::Arc;

use cadence_registry::RegistryError;

use super::read_number;
use super::report::same_sink;
use crate::context::HookContext;
use crate::error::HookError;
use crate::hook::{Hook, HookRef};
use crate::time_step::TimeStep;

/// Registry prefix under which accumulators store their state.
pub const ACCUMULATOR_ROOT: &str = "shared.accumulators";

/// Registry path of the accumulator for `source`.
#[must_use]
pub fn accumulator_path(source: &str) -> String {
    format!("{ACCUMULATOR_ROOT}.{source}")
}

/// Accumulated state of one value over the current window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Accumulated {
    /// Sum of the values seen in the window.
    pub sum: f64,
    /// Number of values seen in the window.
    pub count: u64,
    window_closed: bool,
}

impl Accumulated {
    /// Mean of the window, or `None` if it is empty.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Returns `true` if the window closed on the last accumulation and will
    /// restart on the next one.
    #[must_use]
    pub fn window_closed(&self) -> bool {
        self.window_closed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// NumberAccumulator
// ─────────────────────────────────────────────────────────────────────────────

/// Inline hook summing a numeric registry value every iteration.
///
/// The window restarts on the first accumulation after a tick where `window`
/// was due, so hooks reading the accumulator on that tick see the full window.
#[derive(Debug, Clone)]
pub struct NumberAccumulator {
    name: String,
    source: Vec<String>,
    target: String,
    window: TimeStep,
}

impl NumberAccumulator {
    /// Accumulates `source`, closing the window whenever `window` is due.
    #[must_use]
    pub fn new(source: impl Into<String>, window: TimeStep) -> Self {
        let source = source.into();
        Self {
            name: format!("accumulate({source})"),
            target: accumulator_path(&source),
            source: vec![source],
            window: window.unlimited(),
        }
    }

    /// Path of the value being accumulated.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source[0]
    }

    /// Path the accumulated state is stored at.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Hook for NumberAccumulator {
    fn name(&self) -> &str {
        &self.name
    }

    fn time_step(&self) -> TimeStep {
        TimeStep::every_iteration()
    }

    fn required_registry_entries(&self) -> &[String] {
        &self.source
    }

    fn invoke(&self, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        let value = read_number(ctx, self.source())?;
        let counters = ctx.counters();
        let registry = ctx.registry_mut()?;

        let mut accumulated = match registry.get::<Accumulated>(&self.target) {
            Ok(accumulated) if accumulated.window_closed => Accumulated::default(),
            Ok(accumulated) => *accumulated,
            Err(RegistryError::MissingEntry(_)) => Accumulated::default(),
            Err(error) => return Err(error.into()),
        };
        accumulated.sum += value;
        accumulated.count += 1;
        accumulated.window_closed = self.window.is_due(&counters);

        registry.set(&self.target, accumulated)?;
        Ok(())
    }

    fn functionally_equals(&self, other: &dyn Hook) -> bool {
        other
            .downcast_ref::<NumberAccumulator>()
            .is_some_and(|other| self.source == other.source && self.window == other.window)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AccumulatedValueReporter
// ─────────────────────────────────────────────────────────────────────────────

/// Callback receiving `(source path, mean)` for every reported value.
pub type MeanSink = Arc<dyn Fn(&str, f64) + Send + Sync>;

/// Background hook reporting the windowed mean of numeric values.
pub struct AccumulatedValueReporter {
    name: String,
    sources: Vec<String>,
    entries: Vec<String>,
    accumulators: Vec<HookRef>,
    time_step: TimeStep,
    sink: Option<MeanSink>,
}

impl AccumulatedValueReporter {
    /// Reports the mean of each of `sources` at `time_step`.
    pub fn new<I, S>(sources: I, time_step: TimeStep) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources: Vec<String> = sources.into_iter().map(Into::into).collect();
        let entries = sources.iter().map(|source| accumulator_path(source)).collect();
        let accumulators = sources
            .iter()
            .map(|source| Arc::new(NumberAccumulator::new(source.clone(), time_step)) as HookRef)
            .collect();

        Self {
            name: format!("report_mean({})", sources.join(", ")),
            sources,
            entries,
            accumulators,
            time_step,
            sink: None,
        }
    }

    /// Also hands every reported mean to `sink`.
    #[must_use]
    pub fn with_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str, f64) + Send + Sync + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }
}

impl Hook for AccumulatedValueReporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn time_step(&self) -> TimeStep {
        self.time_step
    }

    fn required_registry_entries(&self) -> &[String] {
        &self.entries
    }

    fn required_hooks(&self) -> &[HookRef] {
        &self.accumulators
    }

    fn invoke_in_background(&self) -> bool {
        true
    }

    fn invoke(&self, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        let counters = ctx.counters();
        for (source, entry) in self.sources.iter().zip(&self.entries) {
            let accumulated = ctx.get::<Accumulated>(entry)?;
            let Some(mean) = accumulated.mean() else {
                continue;
            };
            tracing::info!(
                hook = %self.name,
                epoch = counters.epoch,
                iteration = counters.iteration,
                path = %source,
                mean,
                samples = accumulated.count,
                "reported mean"
            );
            if let Some(sink) = &self.sink {
                sink(source, mean);
            }
        }
        Ok(())
    }

    fn functionally_equals(&self, other: &dyn Hook) -> bool {
        other
            .downcast_ref::<AccumulatedValueReporter>()
            .is_some_and(|other| {
                self.sources == other.sources
                    && self.time_step == other.time_step
                    && same_sink(self.sink.as_ref(), other.sink.as_ref())
            })
    }
}

impl fmt::Debug for AccumulatedValueReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccumulatedValueReporter")
            .field("name", &self.name)
            .field("sources", &self.sources)
            .field("time_step", &self.time_step)
            .field("sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use cadence_registry::ParameterRegistry;

    use super::*;
    use crate::registration::OperatorId;
    use crate::time_step::TickCounters;

    fn accumulate(hook: &NumberAccumulator, registry: &mut ParameterRegistry, iteration: u64, value: f64) {
        registry.set(hook.source(), value).unwrap();
        let mut ctx = HookContext::inline(registry, hook.name(), TickCounters::at_iteration(iteration), OperatorId::new(0));
        hook.invoke(&mut ctx).unwrap();
    }

    #[test]
    fn window_restarts_after_it_closes() {
        let hook = NumberAccumulator::new("metrics.loss", TimeStep::every_iterations(2));
        let mut registry = ParameterRegistry::new();

        accumulate(&hook, &mut registry, 1, 1.0);
        accumulate(&hook, &mut registry, 2, 3.0);
        let closed = *registry.get::<Accumulated>(hook.target()).unwrap();
        assert_eq!(closed.mean(), Some(2.0));
        assert!(closed.window_closed());

        accumulate(&hook, &mut registry, 3, 10.0);
        let reopened = *registry.get::<Accumulated>(hook.target()).unwrap();
        assert_eq!(reopened.count, 1);
        assert_eq!(reopened.mean(), Some(10.0));
    }

    #[test]
    fn accumulator_state_lives_under_shared_root() {
        let hook = NumberAccumulator::new("metrics.loss", TimeStep::every_epoch());
        assert_eq!(hook.target(), "shared.accumulators.metrics.loss");
    }

    #[test]
    fn non_numeric_source_is_an_error() {
        let hook = NumberAccumulator::new("metrics.name", TimeStep::every_epoch());
        let mut registry = ParameterRegistry::new();
        registry.set("metrics.name", String::from("loss")).unwrap();

        let mut ctx = HookContext::inline(&mut registry, hook.name(), TickCounters::at_iteration(1), OperatorId::new(0));
        assert!(matches!(
            hook.invoke(&mut ctx),
            Err(HookError::Registry(RegistryError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn reporters_for_the_same_value_share_equal_accumulators() {
        let a = AccumulatedValueReporter::new(["metrics.loss"], TimeStep::every_iterations(5));
        let b = AccumulatedValueReporter::new(["metrics.loss"], TimeStep::every_iterations(5));

        assert!(!Arc::ptr_eq(&a.required_hooks()[0], &b.required_hooks()[0]));
        assert!(a.required_hooks()[0].functionally_equals(&*b.required_hooks()[0]));
    }

    #[test]
    fn reporter_reads_means_from_snapshot() {
        let means = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink_means = Arc::clone(&means);
        let reporter = AccumulatedValueReporter::new(["metrics.loss"], TimeStep::every_iterations(2))
            .with_sink(move |source, mean| sink_means.lock().push((source.to_string(), mean)));

        let mut snapshot = ParameterRegistry::new();
        snapshot
            .set(
                &accumulator_path("metrics.loss"),
                Accumulated {
                    sum: 3.0,
                    count: 2,
                    window_closed: true,
                },
            )
            .unwrap();
        let mut ctx = HookContext::background(snapshot, reporter.name(), TickCounters::at_iteration(2), OperatorId::new(0));
        reporter.invoke(&mut ctx).unwrap();

        assert_eq!(*means.lock(), vec![("metrics.loss".to_string(), 1.5)]);
    }
}
