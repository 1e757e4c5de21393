//! The hook contract.
//!
//! A [`Hook`] is the unit of schedulable work: it declares a cadence, the
//! registry entries it reads, the hooks it depends on, a tie-break priority and
//! an execution channel. A [`Command`] is a hook that fires exactly once.
//!
//! # Channels
//!
//! Inline hooks run one at a time on the operator thread against the live
//! registry and may mutate it. Background hooks run on worker threads against
//! a deep copy of their [`required_registry_entries`](Hook::required_registry_entries),
//! taken after every inline hook of the tick has finished.
//!
//! A background hook that requires an inline hook therefore sees that hook's
//! writes in the same tick. A background hook that requires another background
//! hook only sees its effects on a later tick, and only if they were written
//! back through the registry by an inline hook. An inline hook may not require
//! a background hook; resolution rejects the edge with
//! [`ResolutionError::InlineRequiresBackground`](crate::ResolutionError::InlineRequiresBackground).

use core::fmt;
use std::sync::Arc;

use downcast_rs::{DowncastSync, impl_downcast};

use crate::context::HookContext;
use crate::error::HookError;
use crate::registration::TargetMode;
use crate::time_step::TimeStep;

/// Shared handle to a hook. Dependents hold these to their dependencies.
pub type HookRef = Arc<dyn Hook>;

/// Completion callback of a [`Command`].
pub type OnFinish = Arc<dyn Fn() + Send + Sync>;

/// A schedulable unit of work.
///
/// Only [`name`](Hook::name), [`invoke`](Hook::invoke) and usually
/// [`time_step`](Hook::time_step) need implementing; everything else has a
/// default matching an every-iteration inline hook without dependencies.
///
/// # Example
///
/// ```
/// use cadence_hooks::prelude::*;
///
/// struct LossLogger {
///     entries: Vec<String>,
/// }
///
/// impl Hook for LossLogger {
///     fn name(&self) -> &str {
///         "loss_logger"
///     }
///
///     fn time_step(&self) -> TimeStep {
///         TimeStep::every_iterations(10)
///     }
///
///     fn required_registry_entries(&self) -> &[String] {
///         &self.entries
///     }
///
///     fn invoke_in_background(&self) -> bool {
///         true
///     }
///
///     fn invoke(&self, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
///         let loss = ctx.get::<f64>("metrics.loss")?;
///         println!("iteration {}: loss {loss}", ctx.counters().iteration);
///         Ok(())
///     }
/// }
/// ```
pub trait Hook: DowncastSync {
    /// Name used in logs, events and errors.
    fn name(&self) -> &str;

    /// Cadence at which the hook is due.
    fn time_step(&self) -> TimeStep {
        TimeStep::default()
    }

    /// Registry paths (patterns allowed) this hook reads. Background hooks
    /// only see these entries.
    fn required_registry_entries(&self) -> &[String] {
        &[]
    }

    /// Hooks that must run before this one in every tick where both are due.
    fn required_hooks(&self) -> &[HookRef] {
        &[]
    }

    /// Tie-break among hooks without a dependency relationship; smaller runs
    /// first. Never overrides a dependency.
    fn invoke_priority(&self) -> i32 {
        0
    }

    /// Whether the hook runs on a background worker against a snapshot.
    fn invoke_in_background(&self) -> bool {
        false
    }

    /// Preferred invocation scope, copied onto the registration.
    fn default_target_mode(&self) -> TargetMode {
        TargetMode::Global
    }

    /// Runs the hook.
    ///
    /// # Errors
    ///
    /// Any error stops the training loop when raised inline, and is reported
    /// without side effects on other hooks when raised in the background.
    fn invoke(&self, ctx: &mut HookContext<'_>) -> Result<(), HookError>;

    /// Returns `true` if `other` would have exactly the same effect as `self`,
    /// in which case the resolver executes only one of them per tick.
    ///
    /// Must be reflexive and symmetric. The default only considers a hook
    /// equal to itself.
    fn functionally_equals(&self, other: &dyn Hook) -> bool {
        core::ptr::addr_eq(self, other)
    }

    /// Returns the command view of this hook, if it is one.
    fn as_command(&self) -> Option<&dyn Command> {
        None
    }
}

impl_downcast!(sync Hook);

impl fmt::Debug for dyn Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name())
            .field("time_step", &self.time_step())
            .field("priority", &self.invoke_priority())
            .field("background", &self.invoke_in_background())
            .field("command", &self.as_command().is_some())
            .finish()
    }
}

/// A hook that fires exactly once, on the first tick after registration,
/// regardless of its time step.
///
/// Implementors return `Some(self)` from [`Hook::as_command`].
pub trait Command: Hook {
    /// Callback run after the single invocation finished successfully, on the
    /// channel the command ran on.
    fn on_finish(&self) -> Option<OnFinish> {
        None
    }
}

/// Returns `true` if both hooks are of the same kind (command or regular hook).
#[must_use]
pub fn same_kind(a: &dyn Hook, b: &dyn Hook) -> bool {
    a.as_command().is_some() == b.as_command().is_some()
}
