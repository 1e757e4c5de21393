//! # Cadence Internal Library
//!
//! Re-exports the core Cadence crates for convenience.

/// Layer 1: Hierarchical parameter registry.
pub use cadence_registry;

/// Layer 2: Hook contract, resolver and scheduler.
pub use cadence_hooks;

/// Layer 3: Training operator loop.
pub use cadence_operator;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use cadence_hooks::prelude::*;
    pub use cadence_operator::prelude::*;
    pub use cadence_registry::prelude::*;
}
