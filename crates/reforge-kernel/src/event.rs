//! Reload event vocabulary
//!
//! Events are published on a broadcast channel by the reload manager, only
//! at step boundaries of a transaction so observers never see a mid-step
//! view.

use std::path::PathBuf;
use std::time::Duration;

/// Events emitted while the engine observes changes and executes reload
/// transactions.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ReloadEvent {
    /// A source change was mapped to a unit (watcher trigger).
    UnitChanged {
        /// Affected unit.
        unit: String,
        /// The changed path.
        path: PathBuf,
    },
    /// A reload transaction started executing the given plan.
    TransactionStarted {
        /// Units in reload order.
        plan: Vec<String>,
    },
    /// One unit was reloaded onto new code.
    UnitReloaded {
        /// The reloaded unit.
        unit: String,
    },
    /// A unit failed to load or unload; rollback follows.
    UnitFailed {
        /// The failing unit.
        unit: String,
        /// Host-reported reason.
        error: String,
    },
    /// Rollback of already-processed units started.
    RollbackStarted {
        /// Units to restore, in reverse plan order.
        units: Vec<String>,
    },
    /// One unit was restored to its pre-transaction snapshot.
    UnitRestored {
        /// The restored unit.
        unit: String,
    },
    /// The whole plan was applied.
    TransactionCommitted {
        /// Units in reload order.
        plan: Vec<String>,
        /// Wall-clock duration of the transaction.
        duration: Duration,
    },
    /// The transaction failed and every snapshotted unit was restored.
    TransactionRolledBack {
        /// Units that had been processed before the failure.
        restored: Vec<String>,
    },
    /// The transaction failed and rollback could not restore every unit.
    /// The system may be inconsistent; this must reach the operator.
    TransactionPartiallyRolledBack {
        /// Units left in an unknown state.
        failed: Vec<String>,
    },
}
