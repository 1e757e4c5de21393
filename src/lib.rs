//! A hook scheduling engine for machine-learning training loops.
//!
//! Hooks declare a cadence, the registry entries they read and the hooks they
//! depend on. Cadence resolves them into one deterministic order, runs the due
//! ones inline against the live parameter registry, and hands background hooks
//! a frozen snapshot on a worker.
//!
//! ```
//! use std::sync::Arc;
//!
//! use cadence::prelude::*;
//! use cadence::cadence_hooks::builtin::StopTrainingHook;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let mut operator = Operator::new(
//!     OperatorConfig::default()
//!         .with_max_epochs(None)
//!         .with_iterations_per_epoch(10),
//! )
//! .unwrap();
//! operator.add_hook(Arc::new(StopTrainingHook::after_epochs(3)));
//!
//! let summary = operator
//!     .run(|_: &mut ParameterRegistry, _: TickCounters| Ok::<_, RegistryError>(()))
//!     .await
//!     .unwrap();
//! assert_eq!(summary.counters.epoch, 3);
//! # });
//! ```

pub use cadence_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use cadence_internal::prelude::*;
}
