//! Closure-backed hooks and commands.

use core::fmt;
use std::sync::Arc;

use crate::context::HookContext;
use crate::error::HookError;
use crate::hook::{Command, Hook, HookRef, OnFinish};
use crate::registration::TargetMode;
use crate::time_step::TimeStep;

type HookFn = dyn Fn(&mut HookContext<'_>) -> Result<(), HookError> + Send + Sync;

// ─────────────────────────────────────────────────────────────────────────────
// FnHook
// ─────────────────────────────────────────────────────────────────────────────

/// A hook whose body is a closure.
///
/// Two `FnHook`s are functionally equal when they share an
/// [`equivalence_key`](FnHookBuilder::equivalence_key), time step, required
/// entries and channel. Without a key a hook is only equal to itself.
///
/// # Example
///
/// ```
/// use cadence_hooks::prelude::*;
///
/// let log_loss = FnHook::builder("log_loss", |ctx| {
///     let loss = ctx.get::<f64>("metrics.loss")?;
///     println!("loss = {loss}");
///     Ok(())
/// })
/// .every(10)
/// .reads("metrics.loss")
/// .background()
/// .into_ref();
///
/// assert_eq!(log_loss.name(), "log_loss");
/// assert!(log_loss.invoke_in_background());
/// ```
pub struct FnHook {
    name: String,
    time_step: TimeStep,
    required_entries: Vec<String>,
    required_hooks: Vec<HookRef>,
    priority: i32,
    background: bool,
    target_mode: TargetMode,
    equivalence_key: Option<String>,
    handler: Arc<HookFn>,
}

impl FnHook {
    /// Starts building a hook named `name` running `handler`.
    pub fn builder<F>(name: impl Into<String>, handler: F) -> FnHookBuilder
    where
        F: Fn(&mut HookContext<'_>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        FnHookBuilder {
            hook: FnHook {
                name: name.into(),
                time_step: TimeStep::default(),
                required_entries: Vec::new(),
                required_hooks: Vec::new(),
                priority: 0,
                background: false,
                target_mode: TargetMode::Global,
                equivalence_key: None,
                handler: Arc::new(handler),
            },
        }
    }

    /// The key used for functional equivalence, if any.
    #[must_use]
    pub fn equivalence_key(&self) -> Option<&str> {
        self.equivalence_key.as_deref()
    }

    fn same_behaviour(&self, other: &FnHook) -> bool {
        if core::ptr::eq(self, other) {
            return true;
        }
        match (&self.equivalence_key, &other.equivalence_key) {
            (Some(own), Some(theirs)) => {
                own == theirs
                    && self.time_step == other.time_step
                    && self.required_entries == other.required_entries
                    && self.background == other.background
            }
            _ => false,
        }
    }
}

impl Hook for FnHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn time_step(&self) -> TimeStep {
        self.time_step
    }

    fn required_registry_entries(&self) -> &[String] {
        &self.required_entries
    }

    fn required_hooks(&self) -> &[HookRef] {
        &self.required_hooks
    }

    fn invoke_priority(&self) -> i32 {
        self.priority
    }

    fn invoke_in_background(&self) -> bool {
        self.background
    }

    fn default_target_mode(&self) -> TargetMode {
        self.target_mode
    }

    fn invoke(&self, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        (self.handler)(ctx)
    }

    fn functionally_equals(&self, other: &dyn Hook) -> bool {
        other
            .downcast_ref::<FnHook>()
            .is_some_and(|other| self.same_behaviour(other))
    }
}

impl fmt::Debug for FnHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHook")
            .field("name", &self.name)
            .field("time_step", &self.time_step)
            .field("required_entries", &self.required_entries)
            .field("required_hooks", &self.required_hooks.len())
            .field("priority", &self.priority)
            .field("background", &self.background)
            .field("equivalence_key", &self.equivalence_key)
            .finish_non_exhaustive()
    }
}

/// Builder for [`FnHook`].
#[derive(Debug)]
pub struct FnHookBuilder {
    hook: FnHook,
}

impl FnHookBuilder {
    /// Due every `interval` iterations.
    #[must_use]
    pub fn every(mut self, interval: u64) -> Self {
        self.hook.time_step = TimeStep::every_iterations(interval);
        self
    }

    /// Due at the end of every `interval`-th epoch.
    #[must_use]
    pub fn every_epochs(mut self, interval: u64) -> Self {
        self.hook.time_step = TimeStep::every_epochs(interval);
        self
    }

    /// Sets an explicit time step.
    #[must_use]
    pub fn time_step(mut self, time_step: TimeStep) -> Self {
        self.hook.time_step = time_step;
        self
    }

    /// Limits the hook to `lives` firings.
    #[must_use]
    pub fn live_time(mut self, lives: u64) -> Self {
        self.hook.time_step = self.hook.time_step.with_live_time(lives);
        self
    }

    /// Adds a required hook.
    #[must_use]
    pub fn requires(mut self, hook: HookRef) -> Self {
        self.hook.required_hooks.push(hook);
        self
    }

    /// Adds a required registry path or pattern.
    #[must_use]
    pub fn reads(mut self, path: impl Into<String>) -> Self {
        self.hook.required_entries.push(path.into());
        self
    }

    /// Sets the tie-break priority (smaller runs first).
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.hook.priority = priority;
        self
    }

    /// Runs the hook on a background worker.
    #[must_use]
    pub fn background(mut self) -> Self {
        self.hook.background = true;
        self
    }

    /// Sets the default target mode.
    #[must_use]
    pub fn target_mode(mut self, mode: TargetMode) -> Self {
        self.hook.target_mode = mode;
        self
    }

    /// Opts into functional equivalence with other hooks carrying the same key.
    #[must_use]
    pub fn equivalence_key(mut self, key: impl Into<String>) -> Self {
        self.hook.equivalence_key = Some(key.into());
        self
    }

    /// Finishes the hook.
    #[must_use]
    pub fn build(self) -> FnHook {
        self.hook
    }

    /// Finishes the hook behind a shared handle.
    #[must_use]
    pub fn into_ref(self) -> HookRef {
        Arc::new(self.hook)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FnCommand
// ─────────────────────────────────────────────────────────────────────────────

/// A command whose body is a closure.
///
/// Shares [`FnHook`]'s attributes and equivalence rules; the time step is
/// ignored for due-checks.
pub struct FnCommand {
    inner: FnHook,
    on_finish: Option<OnFinish>,
}

impl FnCommand {
    /// Starts building a command named `name` running `handler`.
    pub fn builder<F>(name: impl Into<String>, handler: F) -> FnCommandBuilder
    where
        F: Fn(&mut HookContext<'_>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        FnCommandBuilder {
            inner: FnHook::builder(name, handler),
            on_finish: None,
        }
    }
}

impl Hook for FnCommand {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn time_step(&self) -> TimeStep {
        self.inner.time_step()
    }

    fn required_registry_entries(&self) -> &[String] {
        self.inner.required_registry_entries()
    }

    fn required_hooks(&self) -> &[HookRef] {
        self.inner.required_hooks()
    }

    fn invoke_priority(&self) -> i32 {
        self.inner.invoke_priority()
    }

    fn invoke_in_background(&self) -> bool {
        self.inner.invoke_in_background()
    }

    fn default_target_mode(&self) -> TargetMode {
        self.inner.default_target_mode()
    }

    fn invoke(&self, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        self.inner.invoke(ctx)
    }

    fn functionally_equals(&self, other: &dyn Hook) -> bool {
        other
            .downcast_ref::<FnCommand>()
            .is_some_and(|other| self.inner.same_behaviour(&other.inner))
    }

    fn as_command(&self) -> Option<&dyn Command> {
        Some(self)
    }
}

impl Command for FnCommand {
    fn on_finish(&self) -> Option<OnFinish> {
        self.on_finish.clone()
    }
}

impl fmt::Debug for FnCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCommand")
            .field("inner", &self.inner)
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

/// Builder for [`FnCommand`].
pub struct FnCommandBuilder {
    inner: FnHookBuilder,
    on_finish: Option<OnFinish>,
}

impl fmt::Debug for FnCommandBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCommandBuilder")
            .field("inner", &self.inner)
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

impl FnCommandBuilder {
    /// Adds a required hook; only other commands are valid dependencies.
    #[must_use]
    pub fn requires(mut self, hook: HookRef) -> Self {
        self.inner = self.inner.requires(hook);
        self
    }

    /// Adds a required registry path or pattern.
    #[must_use]
    pub fn reads(mut self, path: impl Into<String>) -> Self {
        self.inner = self.inner.reads(path);
        self
    }

    /// Sets the tie-break priority (smaller runs first).
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.inner = self.inner.priority(priority);
        self
    }

    /// Runs the command on a background worker.
    #[must_use]
    pub fn background(mut self) -> Self {
        self.inner = self.inner.background();
        self
    }

    /// Opts into functional equivalence with other commands carrying the same key.
    #[must_use]
    pub fn equivalence_key(mut self, key: impl Into<String>) -> Self {
        self.inner = self.inner.equivalence_key(key);
        self
    }

    /// Sets the completion callback.
    #[must_use]
    pub fn on_finish<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_finish = Some(Arc::new(callback));
        self
    }

    /// Finishes the command.
    #[must_use]
    pub fn build(self) -> FnCommand {
        FnCommand {
            inner: self.inner.build(),
            on_finish: self.on_finish,
        }
    }

    /// Finishes the command behind a shared handle.
    #[must_use]
    pub fn into_ref(self) -> HookRef {
        Arc::new(self.build())
    }
}
