//! Per-tick hook scheduling.
//!
//! [`HookScheduler`] owns the registrations of one operator and drives them
//! tick by tick:
//!
//! 1. resolve the hook graph if the hook set changed;
//! 2. filter the resolved order down to due hooks;
//! 3. run inline hooks one at a time against the live registry;
//! 4. snapshot each background hook's required entries and hand it to a
//!    blocking worker without waiting for it.
//!
//! Inline failures abort the tick and are returned to the caller. Background
//! failures (snapshot errors, hook errors, panics) only surface as
//! [`SchedulerEvent::BackgroundFailed`].

use core::any::Any;
use core::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use cadence_registry::ParameterRegistry;
use hashbrown::{HashMap, HashSet};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::context::{HookContext, SignalEnvelope};
use crate::error::{HookError, ResolutionError, ScheduleError};
use crate::events::{Channel, HookPhase, SchedulerEvent};
use crate::hook::{Command, HookRef};
use crate::registration::{HookHandle, OperatorId, TargetMode};
use crate::resolver::{self, HookId, ResolvedNode, ResolvedSchedule, hook_key};
use crate::time_step::TickCounters;

type EventSender = UnboundedSender<SchedulerEvent>;

fn emit(events: Option<&EventSender>, event: SchedulerEvent) {
    if let Some(events) = events {
        events.send(event).ok();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TickReport
// ─────────────────────────────────────────────────────────────────────────────

/// Final phase of one resolved hook in a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutcome {
    /// Resolved id of the hook.
    pub hook_id: HookId,
    /// The hook's name.
    pub name: String,
    /// Channel the hook runs on.
    pub channel: Channel,
    /// Phase the hook reached during the tick.
    pub phase: HookPhase,
}

/// What happened to every resolved hook during one tick, in resolved order.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    counters: TickCounters,
    outcomes: Vec<HookOutcome>,
}

impl TickReport {
    fn new(counters: TickCounters) -> Self {
        Self {
            counters,
            outcomes: Vec::new(),
        }
    }

    fn record(&mut self, node: &ResolvedNode, phase: HookPhase) {
        self.outcomes.push(HookOutcome {
            hook_id: node.id(),
            name: node.name().to_string(),
            channel: Channel::of(node.hook().invoke_in_background()),
            phase,
        });
    }

    /// Counters of the tick.
    #[must_use]
    pub fn counters(&self) -> TickCounters {
        self.counters
    }

    /// Outcome of every resolved hook.
    #[must_use]
    pub fn outcomes(&self) -> &[HookOutcome] {
        &self.outcomes
    }

    /// Names of the inline hooks that ran, in execution order.
    #[must_use]
    pub fn inline(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| {
                outcome.channel == Channel::Inline
                    && matches!(outcome.phase, HookPhase::Completed | HookPhase::Consumed)
            })
            .map(|outcome| outcome.name.as_str())
            .collect()
    }

    /// Names of the background hooks dispatched, in dispatch order.
    #[must_use]
    pub fn background(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.phase == HookPhase::BackgroundDispatched)
            .map(|outcome| outcome.name.as_str())
            .collect()
    }

    /// Number of hooks that were not due.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.phase == HookPhase::Skipped)
            .count()
    }

    /// Phase reached by the first hook called `name`.
    #[must_use]
    pub fn phase_of(&self, name: &str) -> Option<HookPhase> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.name == name)
            .map(|outcome| outcome.phase)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HookScheduler
// ─────────────────────────────────────────────────────────────────────────────

struct Registration {
    handle: HookHandle,
    hook: HookRef,
    target_mode: TargetMode,
}

/// Resolves, filters and dispatches the hooks of one operator.
///
/// # Example
///
/// ```
/// use cadence_hooks::prelude::*;
/// use cadence_registry::ParameterRegistry;
///
/// let mut scheduler = HookScheduler::new(OperatorId::next());
/// scheduler.add(
///     FnHook::builder("count", |ctx| {
///         let seen = ctx.get::<u64>("seen").copied().unwrap_or(0);
///         ctx.set("seen", seen + 1)
///     })
///     .into_ref(),
/// );
///
/// let mut registry = ParameterRegistry::new();
/// for iteration in 1..=3 {
///     scheduler.tick(TickCounters::at_iteration(iteration), &mut registry).unwrap();
/// }
/// assert_eq!(*registry.get::<u64>("seen").unwrap(), 3);
/// ```
pub struct HookScheduler {
    operator: OperatorId,
    registrations: Vec<Registration>,
    next_registration: u64,
    schedule: Option<Arc<ResolvedSchedule>>,
    // Per-hook state is keyed by handle address and keeps the handle alive,
    // so the address cannot be reused while the entry exists.
    consumed: HashMap<usize, HookRef>,
    lives: HashMap<usize, (HookRef, u64)>,
    runtime: Option<Handle>,
    background: JoinSet<()>,
    events: Option<EventSender>,
    signals: Option<UnboundedSender<SignalEnvelope>>,
    cancellation: CancellationToken,
}

impl HookScheduler {
    /// Creates an empty scheduler for `operator`.
    ///
    /// Background hooks are dispatched on the tokio runtime current at tick
    /// time unless one is set with [`with_runtime`](Self::with_runtime).
    #[must_use]
    pub fn new(operator: OperatorId) -> Self {
        Self {
            operator,
            registrations: Vec::new(),
            next_registration: 0,
            schedule: None,
            consumed: HashMap::new(),
            lives: HashMap::new(),
            runtime: None,
            background: JoinSet::new(),
            events: None,
            signals: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Dispatches background hooks on `runtime`.
    #[must_use]
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// The operator this scheduler belongs to.
    #[must_use]
    pub fn operator(&self) -> OperatorId {
        self.operator
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers a hook with its default target mode.
    pub fn add(&mut self, hook: HookRef) -> HookHandle {
        let mode = hook.default_target_mode();
        self.add_with_target(hook, mode)
    }

    /// Registers a hook with an explicit target mode.
    pub fn add_with_target(&mut self, hook: HookRef, target_mode: TargetMode) -> HookHandle {
        let handle = HookHandle::new(self.next_registration, self.operator);
        self.next_registration += 1;

        tracing::debug!(hook = hook.name(), %handle, ?target_mode, "hook registered");
        self.registrations.push(Registration {
            handle,
            hook,
            target_mode,
        });
        self.schedule = None;
        handle
    }

    /// Unregisters the hook behind `handle`, returning it.
    pub fn remove(&mut self, handle: HookHandle) -> Option<HookRef> {
        let index = self
            .registrations
            .iter()
            .position(|registration| registration.handle == handle)?;
        let registration = self.registrations.remove(index);

        tracing::debug!(hook = registration.hook.name(), %handle, "hook unregistered");
        self.forget(&registration.hook);
        self.schedule = None;
        Some(registration.hook)
    }

    /// Unregisters every registration of `hook` (compared by handle identity).
    ///
    /// Returns `true` if anything was removed.
    pub fn remove_hook(&mut self, hook: &HookRef) -> bool {
        let key = hook_key(hook);
        let before = self.registrations.len();
        self.registrations
            .retain(|registration| hook_key(&registration.hook) != key);

        let removed = self.registrations.len() != before;
        if removed {
            self.forget(hook);
            self.schedule = None;
        }
        removed
    }

    fn forget(&mut self, hook: &HookRef) {
        let key = hook_key(hook);
        if self
            .registrations
            .iter()
            .all(|registration| hook_key(&registration.hook) != key)
        {
            self.consumed.remove(&key);
            self.lives.remove(&key);
        }
    }

    /// Registered hooks in registration order.
    pub fn registrations(&self) -> impl Iterator<Item = (HookHandle, &HookRef, TargetMode)> {
        self.registrations
            .iter()
            .map(|registration| (registration.handle, &registration.hook, registration.target_mode))
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Returns `true` if no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Target mode a resolved node runs with: its registration's mode, or the
    /// hook's default for hooks reached only as dependencies.
    #[must_use]
    pub fn target_mode(&self, node: &ResolvedNode) -> TargetMode {
        node.registration()
            .and_then(|index| self.registrations.get(index))
            .map_or_else(|| node.hook().default_target_mode(), |registration| registration.target_mode)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolves the hook graph, reusing the cached result when the hook set
    /// has not changed. Call before the first tick to fail fast.
    ///
    /// # Errors
    ///
    /// Returns the [`ResolutionError`] of an invalid hook set.
    pub fn resolve(&mut self) -> Result<Arc<ResolvedSchedule>, ResolutionError> {
        if let Some(schedule) = &self.schedule {
            return Ok(Arc::clone(schedule));
        }

        let hooks: Vec<HookRef> = self
            .registrations
            .iter()
            .map(|registration| Arc::clone(&registration.hook))
            .collect();
        let schedule = match resolver::resolve(&hooks) {
            Ok(schedule) => Arc::new(schedule),
            Err(error) => {
                tracing::error!(operator = %self.operator, %error, "hook resolution failed");
                return Err(error);
            }
        };

        tracing::info!(
            operator = %self.operator,
            hooks = schedule.len(),
            collapsed = schedule.collapsed(),
            order = ?schedule.names(),
            "hook schedule resolved"
        );
        self.emit(SchedulerEvent::Resolved {
            hook_count: schedule.len(),
            collapsed: schedule.collapsed(),
        });
        self.retain_state_of(&schedule);
        self.schedule = Some(Arc::clone(&schedule));
        Ok(schedule)
    }

    /// The cached execution order, if resolved.
    #[must_use]
    pub fn schedule(&self) -> Option<&Arc<ResolvedSchedule>> {
        self.schedule.as_ref()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tick
    // ─────────────────────────────────────────────────────────────────────────

    /// Runs every hook due at `counters`.
    ///
    /// Returns once inline hooks have finished and background hooks have been
    /// dispatched; background work keeps running afterwards.
    ///
    /// # Errors
    ///
    /// - [`ScheduleError::Resolution`] if the hook set is invalid.
    /// - [`ScheduleError::Invocation`] for the first failing inline hook; later
    ///   inline hooks and all background hooks of the tick are not run.
    pub fn tick(
        &mut self,
        counters: TickCounters,
        registry: &mut ParameterRegistry,
    ) -> Result<TickReport, ScheduleError> {
        let schedule = self.resolve()?;
        self.reap_finished();

        let started = Instant::now();
        let mut report = TickReport::new(counters);
        let mut inline = Vec::new();
        let mut background = Vec::new();

        for node in schedule.iter() {
            if !self.take_due(node, &counters) {
                report.record(node, HookPhase::Skipped);
            } else if node.hook().invoke_in_background() {
                background.push(node);
            } else {
                inline.push(node);
            }
        }

        tracing::debug!(
            %counters,
            inline = inline.len(),
            background = background.len(),
            "tick"
        );
        self.emit(SchedulerEvent::TickStart {
            counters,
            due: inline.len() + background.len(),
        });

        for node in &inline {
            self.run_inline(node, counters, registry, &mut report)?;
        }
        for node in &background {
            self.dispatch_background(node, counters, registry, &mut report);
        }

        self.emit(SchedulerEvent::TickComplete {
            counters,
            inline: inline.len(),
            background: report.background().len(),
            duration: started.elapsed(),
        });
        Ok(report)
    }

    /// Drops consumed flags and live counters of hooks outside `schedule`.
    fn retain_state_of(&mut self, schedule: &ResolvedSchedule) {
        let scheduled: HashSet<usize> = schedule.iter().map(|node| hook_key(node.hook())).collect();
        self.consumed.retain(|key, _| scheduled.contains(key));
        self.lives.retain(|key, _| scheduled.contains(key));
    }

    fn take_due(&mut self, node: &ResolvedNode, counters: &TickCounters) -> bool {
        let key = hook_key(node.hook());
        if node.hook().as_command().is_some() {
            if self.consumed.contains_key(&key) {
                return false;
            }
            self.consumed.insert(key, Arc::clone(node.hook()));
            return true;
        }

        let step = node.hook().time_step();
        if !step.is_due(counters) {
            return false;
        }
        let Some(lives) = step.live_time() else {
            return true;
        };

        let (_, remaining) = self
            .lives
            .entry(key)
            .or_insert_with(|| (Arc::clone(node.hook()), lives));
        if *remaining == 0 {
            return false;
        }
        *remaining -= 1;
        true
    }

    fn run_inline(
        &self,
        node: &ResolvedNode,
        counters: TickCounters,
        registry: &mut ParameterRegistry,
        report: &mut TickReport,
    ) -> Result<(), ScheduleError> {
        let hook = node.hook();
        self.emit(SchedulerEvent::HookStart {
            hook_id: node.id(),
            hook_name: hook.name().to_string(),
            phase: HookPhase::InlineExecuting,
        });

        let started = Instant::now();
        let result = {
            let mut ctx = HookContext::inline(registry, hook.name(), counters, self.operator)
                .with_target_mode(self.target_mode(node))
                .with_signals(self.signals.clone())
                .with_cancellation(self.cancellation.clone());
            hook.invoke(&mut ctx)
        };

        if let Err(error) = result {
            tracing::error!(hook = hook.name(), %counters, %error, "inline hook failed");
            self.emit(SchedulerEvent::HookFailed {
                hook_id: node.id(),
                hook_name: hook.name().to_string(),
                error: error.to_string(),
            });
            return Err(ScheduleError::Invocation {
                hook: hook.name().to_string(),
                source: error,
            });
        }

        let duration = started.elapsed();
        tracing::debug!(hook = hook.name(), ?duration, "inline hook completed");
        self.emit(SchedulerEvent::HookComplete {
            hook_id: node.id(),
            hook_name: hook.name().to_string(),
            channel: Channel::Inline,
            duration,
        });

        if let Some(command) = hook.as_command() {
            finish_command(command, node.id(), Channel::Inline, self.events.as_ref());
            report.record(node, HookPhase::Consumed);
        } else {
            report.record(node, HookPhase::Completed);
        }
        Ok(())
    }

    fn dispatch_background(
        &mut self,
        node: &ResolvedNode,
        counters: TickCounters,
        registry: &ParameterRegistry,
        report: &mut TickReport,
    ) {
        let hook = Arc::clone(node.hook());

        let snapshot = match registry.snapshot(hook.required_registry_entries()) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(hook = hook.name(), %error, "background hook skipped: snapshot failed");
                self.emit(SchedulerEvent::BackgroundFailed {
                    hook_id: node.id(),
                    hook_name: hook.name().to_string(),
                    error: error.to_string(),
                });
                report.record(node, HookPhase::Failed);
                return;
            }
        };

        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            tracing::warn!(hook = hook.name(), "background hook skipped: no tokio runtime");
            self.emit(SchedulerEvent::BackgroundFailed {
                hook_id: node.id(),
                hook_name: hook.name().to_string(),
                error: "no tokio runtime available".to_string(),
            });
            report.record(node, HookPhase::Failed);
            return;
        };

        self.emit(SchedulerEvent::HookStart {
            hook_id: node.id(),
            hook_name: hook.name().to_string(),
            phase: HookPhase::BackgroundDispatched,
        });

        let job = BackgroundJob {
            hook_id: node.id(),
            target_mode: self.target_mode(node),
            hook,
            snapshot,
            counters,
            operator: self.operator,
            events: self.events.clone(),
            signals: self.signals.clone(),
            cancellation: self.cancellation.clone(),
        };
        self.background.spawn_blocking_on(move || job.run(), &runtime);
        report.record(node, HookPhase::BackgroundDispatched);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Background tasks
    // ─────────────────────────────────────────────────────────────────────────

    /// Number of background tasks dispatched and not yet reaped.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.background.len()
    }

    /// Collects finished background tasks without waiting; returns how many
    /// were collected.
    pub fn reap_finished(&mut self) -> usize {
        let mut reaped = 0;
        while let Some(result) = self.background.try_join_next() {
            reaped += 1;
            if let Err(error) = result {
                tracing::warn!(%error, "background task did not complete");
            }
        }
        reaped
    }

    /// Waits for every in-flight background task; returns how many finished.
    pub async fn drain(&mut self) -> usize {
        let mut drained = 0;
        while let Some(result) = self.background.join_next().await {
            drained += 1;
            if let Err(error) = result {
                tracing::warn!(%error, "background task did not complete");
            }
        }
        if drained > 0 {
            tracing::debug!(drained, "background tasks drained");
        }
        drained
    }

    /// Cancels the token handed to every hook context.
    ///
    /// Running background hooks are not interrupted; they can observe the
    /// token and return early.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// The token cancelled by [`cancel`](Self::cancel).
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event and signal channels
    // ─────────────────────────────────────────────────────────────────────────

    /// Subscribes to scheduler events. A new subscription replaces the
    /// previous one; events are only buffered while a subscriber exists.
    pub fn take_events(&mut self) -> UnboundedReceiver<SchedulerEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.events = Some(sender);
        receiver
    }

    /// Subscribes to hook signals. A new subscription replaces the previous
    /// one; without a subscriber, signals are dropped.
    pub fn take_signals(&mut self) -> UnboundedReceiver<SignalEnvelope> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.signals = Some(sender);
        receiver
    }

    fn emit(&self, event: SchedulerEvent) {
        emit(self.events.as_ref(), event);
    }
}

impl fmt::Debug for HookScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookScheduler")
            .field("operator", &self.operator)
            .field("registrations", &self.registrations.len())
            .field("resolved", &self.schedule.is_some())
            .field("in_flight", &self.background.len())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Background execution
// ─────────────────────────────────────────────────────────────────────────────

struct BackgroundJob {
    hook_id: HookId,
    hook: HookRef,
    target_mode: TargetMode,
    snapshot: ParameterRegistry,
    counters: TickCounters,
    operator: OperatorId,
    events: Option<EventSender>,
    signals: Option<UnboundedSender<SignalEnvelope>>,
    cancellation: CancellationToken,
}

impl BackgroundJob {
    fn run(self) {
        let Self {
            hook_id,
            hook,
            target_mode,
            snapshot,
            counters,
            operator,
            events,
            signals,
            cancellation,
        } = self;

        let started = Instant::now();
        let mut ctx = HookContext::background(snapshot, hook.name(), counters, operator)
            .with_target_mode(target_mode)
            .with_signals(signals)
            .with_cancellation(cancellation);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| hook.invoke(&mut ctx)))
            .unwrap_or_else(|payload| Err(HookError::Panicked(panic_message(&*payload))));

        match outcome {
            Ok(()) => {
                let duration = started.elapsed();
                tracing::debug!(hook = hook.name(), ?duration, "background hook completed");
                emit(
                    events.as_ref(),
                    SchedulerEvent::HookComplete {
                        hook_id,
                        hook_name: hook.name().to_string(),
                        channel: Channel::Background,
                        duration,
                    },
                );
                if let Some(command) = hook.as_command() {
                    finish_command(command, hook_id, Channel::Background, events.as_ref());
                }
            }
            Err(error) => {
                tracing::warn!(hook = hook.name(), %counters, %error, "background hook failed");
                emit(
                    events.as_ref(),
                    SchedulerEvent::BackgroundFailed {
                        hook_id,
                        hook_name: hook.name().to_string(),
                        error: error.to_string(),
                    },
                );
            }
        }
    }
}

fn finish_command(command: &dyn Command, hook_id: HookId, channel: Channel, events: Option<&EventSender>) {
    if let Some(on_finish) = command.on_finish() {
        on_finish();
    }
    tracing::debug!(hook = command.name(), %channel, "command finished");
    emit(
        events,
        SchedulerEvent::CommandFinished {
            hook_id,
            hook_name: command.name().to_string(),
            channel,
        },
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fn_hook::{FnCommand, FnHook};

    fn noop(_: &mut HookContext<'_>) -> Result<(), HookError> {
        Ok(())
    }

    #[test]
    fn registration_invalidates_cached_schedule() {
        let mut scheduler = HookScheduler::new(OperatorId::new(0));
        scheduler.add(FnHook::builder("a", noop).into_ref());
        scheduler.resolve().unwrap();
        assert!(scheduler.schedule().is_some());

        let handle = scheduler.add(FnHook::builder("b", noop).into_ref());
        assert!(scheduler.schedule().is_none());
        assert_eq!(scheduler.resolve().unwrap().len(), 2);

        assert_eq!(scheduler.remove(handle).unwrap().name(), "b");
        assert!(scheduler.schedule().is_none());
        assert!(scheduler.remove(handle).is_none());
    }

    #[test]
    fn handles_carry_operator_id() {
        let operator = OperatorId::new(42);
        let mut scheduler = HookScheduler::new(operator);
        let handle = scheduler.add(FnHook::builder("a", noop).into_ref());
        assert_eq!(handle.operator(), operator);
    }

    #[test]
    fn target_mode_override_is_stored() {
        let mut scheduler = HookScheduler::new(OperatorId::new(0));
        let hook = FnHook::builder("local", noop).target_mode(TargetMode::Local).into_ref();
        scheduler.add(Arc::clone(&hook));
        scheduler.add_with_target(FnHook::builder("global", noop).into_ref(), TargetMode::Local);

        let modes: Vec<TargetMode> = scheduler.registrations().map(|(_, _, mode)| mode).collect();
        assert_eq!(modes, vec![TargetMode::Local, TargetMode::Local]);
        assert!(scheduler.remove_hook(&hook));
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn inline_failure_aborts_tick() {
        let mut scheduler = HookScheduler::new(OperatorId::new(0));
        scheduler.add(FnHook::builder("fails", |_| Err(HookError::failed("boom"))).into_ref());
        scheduler.add(
            FnHook::builder("after", |ctx| ctx.set("ran", true))
                .priority(1)
                .into_ref(),
        );

        let mut registry = ParameterRegistry::new();
        let err = scheduler
            .tick(TickCounters::at_iteration(1), &mut registry)
            .unwrap_err();
        assert_eq!(err.hook(), Some("fails"));
        assert!(!registry.contains("ran"));
    }

    #[test]
    fn removal_clears_state_of_dependency_only_hooks() {
        let mut scheduler = HookScheduler::new(OperatorId::new(0));
        let prepare = FnCommand::builder("prepare", noop).into_ref();
        let launch = scheduler.add(FnCommand::builder("launch", noop).requires(prepare).into_ref());
        let warmup = FnHook::builder("warmup", noop).live_time(2).into_ref();
        let ramp = scheduler.add(
            FnHook::builder("ramp", noop)
                .live_time(2)
                .requires(warmup)
                .into_ref(),
        );

        let mut registry = ParameterRegistry::new();
        scheduler.tick(TickCounters::at_iteration(1), &mut registry).unwrap();
        assert_eq!(scheduler.consumed.len(), 2);
        assert_eq!(scheduler.lives.len(), 2);

        scheduler.remove(launch).unwrap();
        scheduler.remove(ramp).unwrap();
        assert!(scheduler.resolve().unwrap().is_empty());
        assert!(scheduler.consumed.is_empty());
        assert!(scheduler.lives.is_empty());
    }

    #[test]
    fn inline_command_is_consumed() {
        let mut scheduler = HookScheduler::new(OperatorId::new(0));
        scheduler.add(FnCommand::builder("init", |ctx| ctx.set("ready", true)).into_ref());

        let mut registry = ParameterRegistry::new();
        let first = scheduler.tick(TickCounters::at_iteration(1), &mut registry).unwrap();
        let second = scheduler.tick(TickCounters::at_iteration(2), &mut registry).unwrap();

        assert_eq!(first.phase_of("init"), Some(HookPhase::Consumed));
        assert_eq!(second.phase_of("init"), Some(HookPhase::Skipped));
    }

    #[test]
    fn background_without_runtime_is_reported() {
        let mut scheduler = HookScheduler::new(OperatorId::new(0));
        let mut events = scheduler.take_events();
        scheduler.add(FnHook::builder("bg", noop).background().into_ref());

        let mut registry = ParameterRegistry::new();
        let report = scheduler.tick(TickCounters::at_iteration(1), &mut registry).unwrap();
        assert_eq!(report.phase_of("bg"), Some(HookPhase::Failed));

        let mut failures = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SchedulerEvent::BackgroundFailed { hook_name, .. } = event {
                failures.push(hook_name);
            }
        }
        assert_eq!(failures, vec!["bg".to_string()]);
    }

    #[test]
    fn panic_message_reads_str_and_string() {
        let from_str: Box<dyn Any + Send> = Box::new("static");
        let from_string: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*from_str), "static");
        assert_eq!(panic_message(&*from_string), "owned");
    }
}
