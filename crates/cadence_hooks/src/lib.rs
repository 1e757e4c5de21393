//! Hook contract, dependency resolution and tick scheduling for Cadence (Layer 2).
//!
//! Training operators periodically invoke hooks for checkpointing, logging,
//! early stopping and parameter updates. This crate decides, for any set of
//! registered hooks, which of them run at a given tick, in what order, and on
//! which channel:
//!
//! - [`Hook`] / [`Command`] - the unit of schedulable work
//! - [`TimeStep`] - cadences and their "no coarser than" partial order
//! - [`resolver`] - graph expansion, deduplication, validation and ordering
//! - [`HookScheduler`] - per-tick due filtering, inline execution and
//!   background dispatch against registry snapshots
//! - [`HookContext`] - what a hook sees while it runs
//! - [`SchedulerEvent`] - the event surface, including background failures
//! - [`builtin`] - ready-made hooks
//!
//! # Example
//!
//! ```
//! use cadence_hooks::prelude::*;
//! use cadence_registry::ParameterRegistry;
//!
//! let step = FnHook::builder("step_lr", |ctx| {
//!     let lr = *ctx.get::<f64>("optimiser.lr")?;
//!     ctx.set("optimiser.lr", lr * 0.5)
//! })
//! .every(2)
//! .into_ref();
//!
//! let mut scheduler = HookScheduler::new(OperatorId::next());
//! scheduler.add(step);
//! scheduler.resolve().unwrap();
//!
//! let mut registry = ParameterRegistry::new();
//! registry.set("optimiser.lr", 1.0_f64).unwrap();
//! for iteration in 1..=4 {
//!     scheduler.tick(TickCounters::at_iteration(iteration), &mut registry).unwrap();
//! }
//! assert_eq!(*registry.get::<f64>("optimiser.lr").unwrap(), 0.25);
//! ```
//!
//! # Architecture
//!
//! - **Layer 1** (`cadence_registry`): parameter storage
//! - **Layer 2** (`cadence_hooks`): hook contract, resolver and scheduler (this crate)
//! - **Layer 3** (`cadence_operator`): the training operator loop

/// Built-in hooks.
pub mod builtin;

/// Per-invocation execution context and hook signals.
pub mod context;

/// Error types.
pub mod error;

/// Scheduler events and hook phases.
pub mod events;

/// Closure-backed hooks and commands.
pub mod fn_hook;

/// The hook and command traits.
pub mod hook;

/// Registration handles and operator ids.
pub mod registration;

/// Dependency resolution.
pub mod resolver;

/// Per-tick scheduling.
pub mod scheduler;

/// Cadences and tick counters.
pub mod time_step;

pub use context::{HookContext, HookSignal, SignalEnvelope};
pub use error::{HookError, ResolutionError, ScheduleError};
pub use events::{Channel, HookPhase, SchedulerEvent};
pub use fn_hook::{FnCommand, FnCommandBuilder, FnHook, FnHookBuilder};
pub use hook::{Command, Hook, HookRef, OnFinish};
pub use registration::{HookHandle, OperatorId, TargetMode};
pub use resolver::{HookId, ResolvedNode, ResolvedSchedule};
pub use scheduler::{HookOutcome, HookScheduler, TickReport};
pub use time_step::{TickCounters, TimeScale, TimeStep};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::context::{HookContext, HookSignal, SignalEnvelope};
    pub use crate::error::{HookError, ResolutionError, ScheduleError};
    pub use crate::events::{Channel, HookPhase, SchedulerEvent};
    pub use crate::fn_hook::{FnCommand, FnHook};
    pub use crate::hook::{Command, Hook, HookRef};
    pub use crate::registration::{HookHandle, OperatorId, TargetMode};
    pub use crate::resolver::{HookId, ResolvedSchedule};
    pub use crate::scheduler::{HookScheduler, TickReport};
    pub use crate::time_step::{TickCounters, TimeScale, TimeStep};
}
