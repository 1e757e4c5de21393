//! Opaque parameter payloads.
//!
//! The registry never interprets the values it stores. A [`Parameter`] only
//! has to be debuggable (for reporting hooks), shareable across threads (for
//! background snapshots) and deep-copyable (so a snapshot never aliases the
//! live registry).

use core::fmt;

use downcast_rs::{DowncastSync, impl_downcast};

/// A value that can be stored in a [`ParameterRegistry`](crate::ParameterRegistry).
///
/// Any type that is `Clone + Debug + Send + Sync + 'static` automatically
/// implements `Parameter`, so tensors, scalars, strings and user structs can
/// all live in the registry without registration.
///
/// `Box<dyn Parameter>` does not implement `Clone` and therefore is not itself a
/// `Parameter`; copy boxed values with [`clone_parameter`](Parameter::clone_parameter).
///
/// # Example
///
/// ```
/// use cadence_registry::{Parameter, ParameterRegistry};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Checkpoint { epoch: u64 }
///
/// let mut registry = ParameterRegistry::new();
/// registry.set("last_checkpoint", Checkpoint { epoch: 3 }).unwrap();
///
/// let value: &dyn Parameter = registry.get_parameter("last_checkpoint").unwrap();
/// assert_eq!(value.downcast_ref::<Checkpoint>(), Some(&Checkpoint { epoch: 3 }));
/// ```
pub trait Parameter: DowncastSync + fmt::Debug {
    /// Returns a deep copy of this value behind a new box.
    fn clone_parameter(&self) -> Box<dyn Parameter>;

    /// Returns the concrete type name for diagnostics.
    fn parameter_type_name(&self) -> &'static str;
}

impl_downcast!(sync Parameter);

impl<T> Parameter for T
where
    T: Clone + fmt::Debug + Send + Sync + 'static,
{
    fn clone_parameter(&self) -> Box<dyn Parameter> {
        Box::new(self.clone())
    }

    fn parameter_type_name(&self) -> &'static str {
        core::any::type_name::<T>()
    }
}
