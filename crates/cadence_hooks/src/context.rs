//! Per-invocation execution context.
//!
//! A [`HookContext`] is bound either to the live registry (inline hooks) or to
//! an owned snapshot of the hook's required entries (background hooks). Hooks
//! should branch on [`HookContext::is_background`] rather than assume a
//! channel: writes through a background context fail with
//! [`HookError::ReadOnlyRegistry`].

use cadence_registry::{Entry, Parameter, ParameterRegistry};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::error::HookError;
use crate::registration::{OperatorId, TargetMode};
use crate::time_step::TickCounters;

/// Message a hook sends to its operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookSignal {
    /// Ask the operator to stop before the next tick.
    StopTraining {
        /// Human-readable reason, logged by the operator.
        reason: String,
    },
    /// Application-defined signal.
    Custom(String),
}

/// A [`HookSignal`] together with the name of the hook that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEnvelope {
    /// Name of the sending hook.
    pub hook: String,
    /// The signal.
    pub signal: HookSignal,
}

enum RegistryAccess<'a> {
    Live(&'a mut ParameterRegistry),
    Snapshot(ParameterRegistry),
}

/// Everything a hook can reach during one invocation.
pub struct HookContext<'a> {
    registry: RegistryAccess<'a>,
    hook: String,
    counters: TickCounters,
    operator: OperatorId,
    target_mode: TargetMode,
    signals: Option<UnboundedSender<SignalEnvelope>>,
    cancellation: CancellationToken,
}

impl<'a> HookContext<'a> {
    /// Creates an inline context over the live registry.
    #[must_use]
    pub fn inline(
        registry: &'a mut ParameterRegistry,
        hook: impl Into<String>,
        counters: TickCounters,
        operator: OperatorId,
    ) -> Self {
        Self {
            registry: RegistryAccess::Live(registry),
            hook: hook.into(),
            counters,
            operator,
            target_mode: TargetMode::Global,
            signals: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Sets the target mode of the registration being invoked.
    #[must_use]
    pub fn with_target_mode(mut self, mode: TargetMode) -> Self {
        self.target_mode = mode;
        self
    }

    /// Attaches the channel [`signal`](Self::signal) sends through.
    #[must_use]
    pub fn with_signals(mut self, signals: Option<UnboundedSender<SignalEnvelope>>) -> Self {
        self.signals = signals;
        self
    }

    /// Attaches the scheduler's cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns `true` when bound to a snapshot on a background worker.
    #[must_use]
    pub fn is_background(&self) -> bool {
        matches!(self.registry, RegistryAccess::Snapshot(_))
    }

    /// Read access to the bound registry (live or snapshot).
    #[must_use]
    pub fn registry(&self) -> &ParameterRegistry {
        match &self.registry {
            RegistryAccess::Live(registry) => &**registry,
            RegistryAccess::Snapshot(registry) => registry,
        }
    }

    /// Write access to the live registry.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::ReadOnlyRegistry`] on a background context.
    pub fn registry_mut(&mut self) -> Result<&mut ParameterRegistry, HookError> {
        match &mut self.registry {
            RegistryAccess::Live(registry) => Ok(&mut **registry),
            RegistryAccess::Snapshot(_) => Err(HookError::ReadOnlyRegistry),
        }
    }

    /// Typed lookup of a registry value.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::Registry`] if the entry is missing or of another type.
    pub fn get<T: Parameter>(&self, path: &str) -> Result<&T, HookError> {
        Ok(self.registry().get::<T>(path)?)
    }

    /// Resolves a pattern against the bound registry.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::Registry`] if the pattern is malformed.
    pub fn resolve(&self, pattern: &str) -> Result<Vec<(String, &Entry)>, HookError> {
        Ok(self.registry().resolve(pattern)?)
    }

    /// Resolves a pattern to the values it matches.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::Registry`] if the pattern is malformed.
    pub fn resolve_values(&self, pattern: &str) -> Result<Vec<(String, &dyn Parameter)>, HookError> {
        Ok(self.registry().resolve_values(pattern)?)
    }

    /// Stores a value in the live registry.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::ReadOnlyRegistry`] on a background context, or
    /// [`HookError::Registry`] if the path is invalid.
    pub fn set<T: Parameter>(&mut self, path: &str, value: T) -> Result<(), HookError> {
        self.registry_mut()?.set(path, value)?;
        Ok(())
    }

    /// Name of the hook being invoked.
    #[must_use]
    pub fn hook_name(&self) -> &str {
        &self.hook
    }

    /// Counters of the current tick.
    #[must_use]
    pub fn counters(&self) -> TickCounters {
        self.counters
    }

    /// The operator the hook is registered with.
    #[must_use]
    pub fn operator(&self) -> OperatorId {
        self.operator
    }

    /// Target mode of the registration being invoked.
    #[must_use]
    pub fn target_mode(&self) -> TargetMode {
        self.target_mode
    }

    /// Sends a signal to the operator.
    ///
    /// Returns `false` if nobody is listening.
    pub fn signal(&self, signal: HookSignal) -> bool {
        let Some(signals) = &self.signals else {
            return false;
        };
        signals
            .send(SignalEnvelope {
                hook: self.hook.clone(),
                signal,
            })
            .is_ok()
    }

    /// Asks the operator to stop training.
    pub fn stop_training(&self, reason: impl Into<String>) -> bool {
        self.signal(HookSignal::StopTraining {
            reason: reason.into(),
        })
    }

    /// Token cancelled when the scheduler is shutting down.
    ///
    /// Long-running background hooks can poll it to finish early.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Shorthand for `cancellation_token().is_cancelled()`.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl HookContext<'static> {
    /// Creates a background context owning a registry snapshot.
    #[must_use]
    pub fn background(
        snapshot: ParameterRegistry,
        hook: impl Into<String>,
        counters: TickCounters,
        operator: OperatorId,
    ) -> Self {
        Self {
            registry: RegistryAccess::Snapshot(snapshot),
            hook: hook.into(),
            counters,
            operator,
            target_mode: TargetMode::Global,
            signals: None,
            cancellation: CancellationToken::new(),
        }
    }
}

impl core::fmt::Debug for HookContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HookContext")
            .field("hook", &self.hook)
            .field("background", &self.is_background())
            .field("counters", &self.counters)
            .field("operator", &self.operator)
            .field("target_mode", &self.target_mode)
            .finish_non_exhaustive()
    }
}
