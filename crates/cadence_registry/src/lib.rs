//! Hierarchical parameter registry for Cadence (Layer 1).
//!
//! `cadence_registry` stores training state as a tree of opaque parameters
//! addressed by `.`-separated paths. It is the single piece of shared state the
//! hook scheduler hands to hooks:
//!
//! - [`ParameterRegistry`] - nested key/value store with tags
//! - [`Parameter`] - the opaque payload trait (any `Clone + Debug + Send + Sync` type)
//! - [`PathPattern`] - path patterns with `*` wildcards and `<tag>` filters
//! - [`RegistryError`] - lookup and snapshot failures
//!
//! # Example
//!
//! ```
//! use cadence_registry::ParameterRegistry;
//!
//! let mut registry = ParameterRegistry::new();
//! registry.set("network.layers.dense1.weights", vec![0.5_f32, 0.25]).unwrap();
//! registry.set("optimiser.learning_rate", 0.01_f64).unwrap();
//! registry.ensure_nested("network.layers.dense1").unwrap().add_tag("trainable");
//!
//! let lr = registry.get::<f64>("optimiser.learning_rate").unwrap();
//! assert_eq!(*lr, 0.01);
//!
//! let trainable = registry.resolve_paths("network.layers.*<trainable>.weights").unwrap();
//! assert_eq!(trainable, vec!["network.layers.dense1.weights".to_string()]);
//! ```
//!
//! # Architecture
//!
//! - **Layer 1** (`cadence_registry`): parameter storage (this crate)
//! - **Layer 2** (`cadence_hooks`): hook contract, resolver and scheduler
//! - **Layer 3** (`cadence_operator`): the training operator loop

/// Registry error types.
pub mod error;

/// The opaque parameter payload trait.
pub mod parameter;

/// Path and pattern parsing.
pub mod path;

/// The hierarchical registry container.
pub mod registry;

pub use error::RegistryError;
pub use parameter::Parameter;
pub use path::PathPattern;
pub use registry::{Entry, ParameterRegistry};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::error::RegistryError;
    pub use crate::parameter::Parameter;
    pub use crate::path::PathPattern;
    pub use crate::registry::{Entry, ParameterRegistry};
}
