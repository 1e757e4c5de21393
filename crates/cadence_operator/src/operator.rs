//! The training operator loop.
//!
//! An [`Operator`] owns the parameter registry and the hook scheduler of one
//! training run. [`Operator::run`] drives the loop:
//!
//! 1. resolve the hook graph, failing before any training work;
//! 2. run a setup tick (counters all zero), where registered commands fire;
//! 3. for every epoch and iteration, run the user step, advance the counters
//!    and tick the scheduler;
//! 4. after each tick, forward scheduler events to observers and act on hook
//!    signals;
//! 5. on completion or stop, optionally wait for in-flight background hooks.

use core::fmt;

use cadence_hooks::error::BoxedError;
use cadence_hooks::{
    HookHandle, HookRef, HookScheduler, HookSignal, OperatorId, ScheduleError, SchedulerEvent,
    SignalEnvelope, TargetMode, TickCounters,
};
use cadence_registry::ParameterRegistry;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::config::OperatorConfig;
use crate::error::{ConfigError, OperatorError};

/// Callback receiving every scheduler event of a run.
pub type EventObserver = Box<dyn Fn(&SchedulerEvent) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// StopHandle
// ─────────────────────────────────────────────────────────────────────────────

/// Requests a running [`Operator`] to stop before its next iteration.
///
/// Cloneable and usable from any thread or task. Stopping is permanent for the
/// operator it came from.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    /// Asks the operator to stop.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Returns `true` once [`stop`](Self::stop) was called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TrainingSummary
// ─────────────────────────────────────────────────────────────────────────────

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// All configured epochs ran.
    Completed,
    /// A hook sent [`HookSignal::StopTraining`].
    Signalled {
        /// Name of the hook.
        hook: String,
        /// Reason given by the hook.
        reason: String,
    },
    /// [`StopHandle::stop`] was called.
    Requested,
}

/// Outcome of a successful [`Operator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSummary {
    /// Counters of the last tick.
    pub counters: TickCounters,
    /// Ticks run, including the setup tick.
    pub ticks: u64,
    /// Why the run ended.
    pub stop_reason: StopReason,
    /// Background hook failures reported during the run.
    pub background_failures: usize,
    /// Custom signals received from hooks, in arrival order.
    pub custom_signals: Vec<SignalEnvelope>,
}

#[derive(Debug, Default)]
struct RunState {
    ticks: u64,
    background_failures: usize,
    custom_signals: Vec<SignalEnvelope>,
    stop: Option<StopReason>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Operator
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the registry and hooks of a training run and drives the loop.
///
/// # Example
///
/// ```
/// use cadence_hooks::prelude::*;
/// use cadence_operator::{Operator, OperatorConfig, StopReason};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let config = OperatorConfig::default()
///     .with_max_epochs(Some(2))
///     .with_iterations_per_epoch(5);
/// let mut operator = Operator::new(config).unwrap();
/// operator.add_hook(
///     FnHook::builder("halve_lr", |ctx| {
///         let lr = *ctx.get::<f64>("optimiser.lr")?;
///         ctx.set("optimiser.lr", lr / 2.0)
///     })
///     .every_epochs(1)
///     .into_ref(),
/// );
/// operator.registry_mut().set("optimiser.lr", 0.1_f64).unwrap();
///
/// let summary = operator
///     .run(|registry, _counters| registry.set("metrics.loss", 0.5_f64).map(drop))
///     .await
///     .unwrap();
///
/// assert_eq!(summary.stop_reason, StopReason::Completed);
/// assert_eq!(summary.counters.iteration, 10);
/// assert_eq!(*operator.registry().get::<f64>("optimiser.lr").unwrap(), 0.025);
/// # });
/// ```
pub struct Operator {
    id: OperatorId,
    config: OperatorConfig,
    registry: ParameterRegistry,
    scheduler: HookScheduler,
    events: UnboundedReceiver<SchedulerEvent>,
    signals: UnboundedReceiver<SignalEnvelope>,
    observers: Vec<EventObserver>,
    counters: TickCounters,
    stop: CancellationToken,
}

impl Operator {
    /// Creates an operator with an empty registry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `config` cannot drive a run.
    pub fn new(config: OperatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let id = OperatorId::next();
        let mut scheduler = HookScheduler::new(id);
        let events = scheduler.take_events();
        let signals = scheduler.take_signals();

        tracing::debug!(operator = %id, ?config, "operator created");
        Ok(Self {
            id,
            config,
            registry: ParameterRegistry::new(),
            scheduler,
            events,
            signals,
            observers: Vec::new(),
            counters: TickCounters::default(),
            stop: CancellationToken::new(),
        })
    }

    /// Replaces the registry.
    #[must_use]
    pub fn with_registry(mut self, registry: ParameterRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// This operator's id, shared by all of its hook registrations.
    #[must_use]
    pub fn id(&self) -> OperatorId {
        self.id
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// The live registry.
    #[must_use]
    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    /// The live registry, mutably.
    pub fn registry_mut(&mut self) -> &mut ParameterRegistry {
        &mut self.registry
    }

    /// The hook scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &HookScheduler {
        &self.scheduler
    }

    /// Counters of the last tick.
    #[must_use]
    pub fn counters(&self) -> TickCounters {
        self.counters
    }

    /// Registers a hook with its default target mode.
    pub fn add_hook(&mut self, hook: HookRef) -> HookHandle {
        self.scheduler.add(hook)
    }

    /// Registers a hook with an explicit target mode.
    pub fn add_hook_with_target(&mut self, hook: HookRef, target_mode: TargetMode) -> HookHandle {
        self.scheduler.add_with_target(hook, target_mode)
    }

    /// Unregisters a hook.
    pub fn remove_hook(&mut self, handle: HookHandle) -> Option<HookRef> {
        self.scheduler.remove(handle)
    }

    /// Handle for stopping the run from elsewhere.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.stop.clone(),
        }
    }

    /// Adds an observer called with every scheduler event, on the operator's
    /// task, after the tick that produced it.
    pub fn on_event<F>(&mut self, observer: F)
    where
        F: Fn(&SchedulerEvent) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Run
    // ─────────────────────────────────────────────────────────────────────────

    /// Trains until the configured epochs ran or something stops the run.
    ///
    /// `step` runs once per iteration before the tick, with the counters the
    /// tick will carry. Must be called on a tokio runtime; background hooks
    /// are dispatched on it.
    ///
    /// Every run starts from zero counters: the setup tick resets them before
    /// the first step.
    ///
    /// # Errors
    ///
    /// - [`OperatorError::Schedule`] if the hook set is invalid (before any
    ///   step runs) or an inline hook fails.
    /// - [`OperatorError::TrainingStep`] if `step` fails.
    ///
    /// Background hook failures never end the run; they are counted in the
    /// summary and forwarded to observers.
    pub async fn run<F, E>(&mut self, mut step: F) -> Result<TrainingSummary, OperatorError>
    where
        F: FnMut(&mut ParameterRegistry, TickCounters) -> Result<(), E>,
        E: Into<BoxedError>,
    {
        self.config.validate()?;
        self.scheduler.resolve().map_err(ScheduleError::from)?;

        tracing::info!(
            operator = %self.id,
            max_epochs = ?self.config.max_epochs,
            iterations_per_epoch = self.config.iterations_per_epoch,
            hooks = self.scheduler.len(),
            "training started"
        );

        let mut run = RunState::default();
        let outcome = self.train(&mut step, &mut run).await;

        if outcome.is_err() || run.stop.is_some() {
            self.scheduler.cancel();
        }
        if self.config.drain_on_stop {
            self.scheduler.drain().await;
        }
        self.process_events(&mut run);
        self.process_signals(&mut run);

        let stop_reason = match outcome {
            Ok(reason) => reason,
            Err(error) => {
                tracing::error!(operator = %self.id, counters = %self.counters, %error, "training failed");
                return Err(error);
            }
        };

        tracing::info!(
            operator = %self.id,
            counters = %self.counters,
            ticks = run.ticks,
            background_failures = run.background_failures,
            reason = ?stop_reason,
            "training finished"
        );
        Ok(TrainingSummary {
            counters: self.counters,
            ticks: run.ticks,
            stop_reason,
            background_failures: run.background_failures,
            custom_signals: run.custom_signals,
        })
    }

    async fn train<F, E>(&mut self, step: &mut F, run: &mut RunState) -> Result<StopReason, OperatorError>
    where
        F: FnMut(&mut ParameterRegistry, TickCounters) -> Result<(), E>,
        E: Into<BoxedError>,
    {
        self.tick(TickCounters::default(), run)?;

        let per_epoch = self.config.iterations_per_epoch;
        let mut epoch = 0;
        while self.config.max_epochs.is_none_or(|max| epoch < max) {
            for index in 1..=per_epoch {
                if let Some(reason) = self.stop_reason(run) {
                    return Ok(reason);
                }

                let iteration = self.counters.iteration + 1;
                let counters = if index == per_epoch {
                    TickCounters::at_epoch_end(epoch + 1, iteration)
                } else {
                    TickCounters::new(epoch, iteration, false)
                };

                step(&mut self.registry, counters).map_err(|error| OperatorError::TrainingStep {
                    counters,
                    source: error.into(),
                })?;
                self.tick(counters, run)?;
                tokio::task::yield_now().await;
            }
            epoch += 1;
        }

        Ok(self.stop_reason(run).unwrap_or(StopReason::Completed))
    }

    fn tick(&mut self, counters: TickCounters, run: &mut RunState) -> Result<(), ScheduleError> {
        self.counters = counters;
        let result = self.scheduler.tick(counters, &mut self.registry);
        run.ticks += 1;
        self.process_events(run);
        self.process_signals(run);
        result.map(drop)
    }

    fn stop_reason(&self, run: &RunState) -> Option<StopReason> {
        if let Some(reason) = &run.stop {
            return Some(reason.clone());
        }
        self.stop.is_cancelled().then(|| {
            tracing::info!(operator = %self.id, counters = %self.counters, "stop requested");
            StopReason::Requested
        })
    }

    fn process_events(&mut self, run: &mut RunState) {
        while let Ok(event) = self.events.try_recv() {
            if let SchedulerEvent::BackgroundFailed { .. } = event {
                run.background_failures += 1;
            }
            for observer in &self.observers {
                observer(&event);
            }
        }
    }

    fn process_signals(&mut self, run: &mut RunState) {
        while let Ok(envelope) = self.signals.try_recv() {
            match &envelope.signal {
                HookSignal::StopTraining { reason } => {
                    if run.stop.is_none() {
                        tracing::info!(
                            operator = %self.id,
                            hook = %envelope.hook,
                            %reason,
                            counters = %self.counters,
                            "hook requested stop"
                        );
                        run.stop = Some(StopReason::Signalled {
                            hook: envelope.hook.clone(),
                            reason: reason.clone(),
                        });
                    }
                }
                HookSignal::Custom(message) => {
                    tracing::debug!(hook = %envelope.hook, %message, "custom hook signal");
                    run.custom_signals.push(envelope);
                }
            }
        }
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("counters", &self.counters)
            .field("scheduler", &self.scheduler)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = OperatorConfig::default().with_iterations_per_epoch(0);
        assert!(matches!(Operator::new(config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn stop_handle_is_shared() {
        let operator = Operator::new(OperatorConfig::default()).unwrap();
        let handle = operator.stop_handle();
        let clone = handle.clone();
        clone.stop();
        assert!(handle.is_stopped());
        assert!(operator.stop_handle().is_stopped());
    }

    #[test]
    fn operator_id_is_unique() {
        let a = Operator::new(OperatorConfig::default()).unwrap();
        let b = Operator::new(OperatorConfig::default()).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
