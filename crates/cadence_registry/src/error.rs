//! Errors raised by registry lookups, writes and snapshots.

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No entry exists at the given path (or no entry matched the pattern).
    #[error("registry entry not found: {0}")]
    MissingEntry(String),

    /// The entry exists but holds a different type than requested.
    #[error("registry entry '{path}' holds {found}, expected {expected}")]
    TypeMismatch {
        /// The path of the entry.
        path: String,
        /// The requested type name.
        expected: &'static str,
        /// The stored type name.
        found: &'static str,
    },

    /// A path segment that must be a nested registry holds a value.
    #[error("registry entry '{0}' is a value, not a nested registry")]
    NotARegistry(String),

    /// A path that must hold a value holds a nested registry.
    #[error("registry entry '{0}' is a nested registry, not a value")]
    NotAValue(String),

    /// The path or pattern could not be parsed.
    #[error("invalid registry path '{path}': {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}
