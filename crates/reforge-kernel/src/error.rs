//! Typed errors for the reload engine.

use thiserror::Error;

/// Result type used throughout the reload engine.
pub type ReloadResult<T> = Result<T, ReloadError>;

/// Errors that can occur while registering, planning, or reloading units.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReloadError {
    /// An operation referenced a unit that was never registered.
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    /// A unit with the same name is already registered.
    #[error("Unit already registered: {0}")]
    DuplicateUnit(String),

    /// A unit declared a dependency that is not present in the registry.
    #[error("Unit {unit} depends on unregistered unit {dependency}")]
    DanglingDependency {
        /// The unit whose edges were being updated.
        unit: String,
        /// The missing dependency.
        dependency: String,
    },

    /// The impact set contains a dependency cycle, so no unambiguous reload
    /// order exists. Members are sorted by name.
    #[error("Cyclic dependency among units: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    /// The host failed to load a unit.
    #[error("Failed to load unit {unit}: {reason}")]
    LoadFailure {
        /// The unit that failed to load.
        unit: String,
        /// Host-reported reason.
        reason: String,
    },

    /// The host failed to unload a unit.
    #[error("Failed to unload unit {unit}: {reason}")]
    UnloadFailure {
        /// The unit that failed to unload.
        unit: String,
        /// Host-reported reason.
        reason: String,
    },

    /// Rollback could not restore every snapshotted unit. The live system
    /// may no longer match any known-good configuration; this is the only
    /// error that should be escalated as a high-severity alert.
    #[error("Partial rollback: units [{}] could not be restored", units.join(", "))]
    PartiallyRolledBack {
        /// Units left in an unknown state, in plan order.
        units: Vec<String>,
        /// One reason per unit in `units`.
        reasons: Vec<String>,
    },

    /// A reload transaction is already in flight.
    #[error("A reload transaction is already executing")]
    Busy,

    /// Catch-all for internal invariant violations.
    #[error("{0}")]
    Internal(String),
}

impl ReloadError {
    /// Whether this error leaves the system in a potentially inconsistent
    /// state. Everything else is recoverable: either nothing was applied or
    /// the rollback fully restored the previous state.
    pub fn is_inconsistent(&self) -> bool {
        matches!(self, ReloadError::PartiallyRolledBack { .. })
    }
}
