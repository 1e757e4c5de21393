//! One-shot registry writes.

use core::fmt;
use std::sync::Arc;

use cadence_registry::Parameter;

use crate::context::HookContext;
use crate::error::HookError;
use crate::hook::{Command, Hook, OnFinish};

/// Command writing a value into the live registry on the first tick after
/// registration.
///
/// # Example
///
/// ```
/// use cadence_hooks::builtin::SetValueCommand;
/// use cadence_hooks::prelude::*;
///
/// let warmup_done = SetValueCommand::new("optimiser.learning_rate", 0.01_f64);
/// assert!(warmup_done.as_command().is_some());
/// ```
pub struct SetValueCommand {
    name: String,
    path: String,
    value: Box<dyn Parameter>,
    on_finish: Option<OnFinish>,
}

impl SetValueCommand {
    /// Writes `value` to `path`.
    pub fn new<T: Parameter>(path: impl Into<String>, value: T) -> Self {
        let path = path.into();
        Self {
            name: format!("set({path})"),
            path,
            value: Box::new(value),
            on_finish: None,
        }
    }

    /// Runs `callback` after the value was written.
    #[must_use]
    pub fn with_on_finish<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_finish = Some(Arc::new(callback));
        self
    }

    /// Path the value is written to.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Hook for SetValueCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        ctx.registry_mut()?
            .set_boxed(&self.path, self.value.clone_parameter())?;
        tracing::debug!(hook = %self.name, value = ?self.value, "registry value set");
        Ok(())
    }

    fn as_command(&self) -> Option<&dyn Command> {
        Some(self)
    }
}

impl Command for SetValueCommand {
    fn on_finish(&self) -> Option<OnFinish> {
        self.on_finish.clone()
    }
}

impl fmt::Debug for SetValueCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetValueCommand")
            .field("path", &self.path)
            .field("value", &self.value)
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use cadence_registry::ParameterRegistry;

    use super::*;
    use crate::registration::OperatorId;
    use crate::time_step::TickCounters;

    #[test]
    fn writes_a_fresh_copy_each_invocation() {
        let command = SetValueCommand::new("schedule.phase", String::from("warmup"));
        let mut registry = ParameterRegistry::new();
        {
            let mut ctx = HookContext::inline(&mut registry, command.name(), TickCounters::at_iteration(1), OperatorId::new(0));
            command.invoke(&mut ctx).unwrap();
        }
        registry.get_mut::<String>("schedule.phase").unwrap().push_str("-edited");

        assert_eq!(registry.get::<String>("schedule.phase").unwrap(), "warmup-edited");
        assert_eq!(command.value.downcast_ref::<String>().unwrap(), "warmup");
    }

    #[test]
    fn refuses_to_write_from_background() {
        let command = SetValueCommand::new("x", 1_u8);
        let mut ctx = HookContext::background(ParameterRegistry::new(), command.name(), TickCounters::at_iteration(1), OperatorId::new(0));
        assert!(matches!(command.invoke(&mut ctx), Err(HookError::ReadOnlyRegistry)));
    }
}
