//! Background value reporting.

use core::fmt;
use std::sync::Arc;

use cadence_registry::Parameter;

use crate::context::HookContext;
use crate::error::HookError;
use crate::hook::Hook;
use crate::time_step::TimeStep;

/// Callback receiving every value a [`ValueReporter`] reports.
pub type ValueSink = Arc<dyn Fn(&str, &dyn Parameter) + Send + Sync>;

/// Logs every registry value matching its patterns, on a background worker.
///
/// Values are emitted as `tracing` events at `INFO` with `path` and `value`
/// fields, and optionally handed to a [`ValueSink`].
pub struct ValueReporter {
    name: String,
    patterns: Vec<String>,
    time_step: TimeStep,
    sink: Option<ValueSink>,
}

impl ValueReporter {
    /// Reports values matching `patterns` at `time_step`.
    pub fn new<I, S>(patterns: I, time_step: TimeStep) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        Self {
            name: format!("report({})", patterns.join(", ")),
            patterns,
            time_step,
            sink: None,
        }
    }

    /// Also hands every reported value to `sink`.
    #[must_use]
    pub fn with_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str, &dyn Parameter) + Send + Sync + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Sets the hook name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Hook for ValueReporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn time_step(&self) -> TimeStep {
        self.time_step
    }

    fn required_registry_entries(&self) -> &[String] {
        &self.patterns
    }

    fn invoke_in_background(&self) -> bool {
        true
    }

    fn invoke(&self, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        let counters = ctx.counters();
        for pattern in &self.patterns {
            for (path, value) in ctx.resolve_values(pattern)? {
                tracing::info!(
                    hook = %self.name,
                    epoch = counters.epoch,
                    iteration = counters.iteration,
                    path = %path,
                    value = ?value,
                    "reported value"
                );
                if let Some(sink) = &self.sink {
                    sink(&path, value);
                }
            }
        }
        Ok(())
    }

    fn functionally_equals(&self, other: &dyn Hook) -> bool {
        other.downcast_ref::<ValueReporter>().is_some_and(|other| {
            self.patterns == other.patterns
                && self.time_step == other.time_step
                && same_sink(self.sink.as_ref(), other.sink.as_ref())
        })
    }
}

pub(crate) fn same_sink<T: ?Sized>(a: Option<&Arc<T>>, b: Option<&Arc<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

impl fmt::Debug for ValueReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueReporter")
            .field("name", &self.name)
            .field("patterns", &self.patterns)
            .field("time_step", &self.time_step)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use cadence_registry::ParameterRegistry;
    use parking_lot::Mutex;

    use super::*;
    use crate::registration::OperatorId;
    use crate::time_step::TickCounters;

    #[test]
    fn reports_every_matching_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let reporter = ValueReporter::new(["metrics.*"], TimeStep::every_iterations(10)).with_sink(
            move |path, value| {
                sink_seen
                    .lock()
                    .push((path.to_string(), *value.downcast_ref::<f64>().unwrap()));
            },
        );

        let mut snapshot = ParameterRegistry::new();
        snapshot.set("metrics.loss", 0.25_f64).unwrap();
        snapshot.set("metrics.accuracy", 0.9_f64).unwrap();
        let mut ctx = HookContext::background(snapshot, reporter.name(), TickCounters::at_iteration(10), OperatorId::new(0));

        reporter.invoke(&mut ctx).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                ("metrics.loss".to_string(), 0.25),
                ("metrics.accuracy".to_string(), 0.9)
            ]
        );
    }

    #[test]
    fn runs_in_background_and_reads_its_patterns() {
        let reporter = ValueReporter::new(["a.b", "c.*"], TimeStep::every_epoch());
        assert!(reporter.invoke_in_background());
        assert_eq!(reporter.required_registry_entries(), ["a.b".to_string(), "c.*".to_string()]);
        assert_eq!(reporter.name(), "report(a.b, c.*)");
    }

    #[test]
    fn equality_respects_patterns_and_sinks() {
        let a = ValueReporter::new(["metrics.*"], TimeStep::every_epoch());
        let b = ValueReporter::new(["metrics.*"], TimeStep::every_epoch());
        let with_sink = ValueReporter::new(["metrics.*"], TimeStep::every_epoch()).with_sink(|_, _| {});

        assert!(a.functionally_equals(&b));
        assert!(!a.functionally_equals(&with_sink));
    }
}
