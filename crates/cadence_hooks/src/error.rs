//! Error types for hook invocation, resolution and scheduling.
//!
//! Setup errors ([`ResolutionError`]) are kept apart from per-tick errors
//! ([`HookError`], [`ScheduleError`]) so callers can fail fast before the first
//! tick.

use cadence_registry::RegistryError;

use crate::time_step::TimeStep;

/// Boxed error type accepted by [`HookError::Other`].
pub type BoxedError = Box<dyn core::error::Error + Send + Sync + 'static>;

/// Failure surfaced from [`Hook::invoke`](crate::Hook::invoke).
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// A registry lookup or write failed (including a missing entry).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A background hook tried to mutate its registry snapshot.
    #[error("background hooks cannot mutate the registry")]
    ReadOnlyRegistry,

    /// The hook reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The hook panicked while running on a background worker.
    #[error("hook panicked: {0}")]
    Panicked(String),

    /// Any other error raised by the hook.
    #[error(transparent)]
    Other(#[from] BoxedError),
}

impl HookError {
    /// Creates a [`HookError::Failed`] from a message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Wraps an arbitrary error as [`HookError::Other`].
    #[must_use]
    pub fn other<E>(error: E) -> Self
    where
        E: core::error::Error + Send + Sync + 'static,
    {
        Self::Other(Box::new(error))
    }

    /// Returns `true` if the failure is a missing registry entry.
    #[must_use]
    pub fn is_missing_entry(&self) -> bool {
        matches!(self, Self::Registry(RegistryError::MissingEntry(_)))
    }
}

/// Configuration error found while resolving the hook graph.
///
/// Every variant is permanent: the hook set must change before resolution
/// can succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    /// The dependency graph contains a cycle.
    #[error("dependency cycle between hooks: {}", .cycle.join(" -> "))]
    DependencyCycle {
        /// Hook names along the cycle; the first name is repeated at the end.
        cycle: Vec<String>,
    },

    /// A required hook fires less often than the hook that depends on it, or a
    /// regular hook requires a command.
    #[error(
        "hook '{dependent}' ({dependent_step}) requires '{required}' ({required_step}), which is scheduled more coarsely"
    )]
    InvalidDependencyTiming {
        /// The hook declaring the dependency.
        dependent: String,
        /// The hook being depended on.
        required: String,
        /// Cadence of the dependent hook.
        dependent_step: TimeStep,
        /// Cadence of the required hook.
        required_step: TimeStep,
    },

    /// An inline hook requires a background hook. Inline hooks run before any
    /// background hook of the same tick is dispatched.
    #[error("inline hook '{dependent}' requires background hook '{required}'")]
    InlineRequiresBackground {
        /// The inline hook declaring the dependency.
        dependent: String,
        /// The background hook being depended on.
        required: String,
    },
}

/// Tick-level failure returned by [`HookScheduler::tick`](crate::HookScheduler::tick).
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// The hook graph could not be resolved.
    #[error("hook resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    /// An inline hook failed; the tick was aborted after it.
    #[error("inline hook '{hook}' failed: {source}")]
    Invocation {
        /// Name of the failing hook.
        hook: String,
        /// The hook's error.
        #[source]
        source: HookError,
    },
}

impl ScheduleError {
    /// Name of the hook that failed, if the error came from an invocation.
    #[must_use]
    pub fn hook(&self) -> Option<&str> {
        match self {
            Self::Resolution(_) => None,
            Self::Invocation { hook, .. } => Some(hook),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_hooks() {
        let err = ResolutionError::DependencyCycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle between hooks: a -> b -> a");
    }

    #[test]
    fn timing_message_names_both_cadences() {
        let err = ResolutionError::InvalidDependencyTiming {
            dependent: "report".into(),
            required: "accumulate".into(),
            dependent_step: TimeStep::every_iteration(),
            required_step: TimeStep::every_iterations(5),
        };
        let message = err.to_string();
        assert!(message.contains("'report' (every iteration)"));
        assert!(message.contains("'accumulate' (every 5 iterations)"));
    }

    #[test]
    fn missing_entry_is_detected_through_wrapping() {
        let err = HookError::from(RegistryError::MissingEntry("metrics.loss".into()));
        assert!(err.is_missing_entry());
        assert!(!HookError::failed("boom").is_missing_entry());
    }

    #[test]
    fn invocation_error_keeps_hook_name() {
        let err = ScheduleError::Invocation {
            hook: "checkpoint".into(),
            source: HookError::failed("disk full"),
        };
        assert_eq!(err.hook(), Some("checkpoint"));
        assert_eq!(err.to_string(), "inline hook 'checkpoint' failed: disk full");
    }
}
