//! Identifiers handed out when hooks are registered.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

static NEXT_OPERATOR_ID: AtomicU64 = AtomicU64::new(0);

/// Identifies the operator a scheduler (and every hook registered with it)
/// belongs to.
///
/// Hooks never hold a reference to their operator; the id is stored on the
/// registration and exposed through [`HookContext::operator`](crate::HookContext::operator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperatorId(u64);

impl OperatorId {
    /// Allocates a process-wide unique operator id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_OPERATOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates an id from a raw value.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operator_{}", self.0)
    }
}

/// Handle returned when a hook is added to a [`HookScheduler`](crate::HookScheduler).
///
/// Used to unregister the hook and to read its operator back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookHandle {
    id: u64,
    operator: OperatorId,
}

impl HookHandle {
    pub(crate) fn new(id: u64, operator: OperatorId) -> Self {
        Self { id, operator }
    }

    /// Registration number, unique within one scheduler.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The operator the hook was registered with.
    #[must_use]
    pub fn operator(&self) -> OperatorId {
        self.operator
    }
}

impl fmt::Display for HookHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/hook_{}", self.operator, self.id)
    }
}

/// Preferred invocation scope of a hook.
///
/// Stored on the registration; the resolver never looks at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TargetMode {
    /// Invoked once for the whole operator.
    #[default]
    Global,
    /// Invoked per local worker of a distributed operator.
    Local,
}
