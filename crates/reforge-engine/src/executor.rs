//! Transactional executor
//!
//! Executes a reload plan against the host's load/unload primitives. Each
//! unit is snapshotted before it is touched; on any failure the executor
//! halts forward progress and walks the already-processed units in reverse,
//! restoring each to its snapshot. Rollback failures never abort the walk:
//! every snapshotted unit gets a restore attempt, and the combined result
//! distinguishes a full rollback from a partial one.
//!
//! Transaction state machine:
//! `Planning -> Executing -> { Committed | RollingBack ->
//! { RolledBack | PartiallyRolledBack } }`
//!
//! Registry and graph mutations happen only at step boundaries, so
//! concurrent read-only status queries always observe a consistent view.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use reforge_kernel::{ExtensionHost, LoadState, ReloadError, ReloadEvent};

use crate::graph::DependencyGraph;
use crate::planner::ReloadPlan;
use crate::registry::UnitRegistry;

/// Per-unit capture of pre-transaction state, held only for the duration of
/// one transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSnapshot {
    /// Snapshotted unit.
    pub unit: String,
    /// Whether the host had the unit loaded.
    pub was_loaded: bool,
    /// Registry state at snapshot time.
    pub state: LoadState,
    /// Outgoing dependency edges at snapshot time.
    pub dependencies: Vec<String>,
}

/// Terminal status of a reload transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Every unit in the plan is on the new code.
    Committed,
    /// The plan failed and every processed unit was restored; the system is
    /// exactly as it was before the attempt.
    RolledBack,
    /// The plan failed and at least one unit could not be restored. The
    /// system may be inconsistent and the operator must be told.
    PartiallyRolledBack,
}

impl TransactionStatus {
    /// Whether the system is known to be in a consistent state.
    pub fn is_consistent(&self) -> bool {
        !matches!(self, TransactionStatus::PartiallyRolledBack)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Committed => write!(f, "Committed"),
            TransactionStatus::RolledBack => write!(f, "RolledBack"),
            TransactionStatus::PartiallyRolledBack => write!(f, "PartiallyRolledBack"),
        }
    }
}

/// What was attempted for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitAction {
    /// Forward pass: unload old code, load new code.
    Reload,
    /// Rollback pass: restore the snapshotted version.
    Restore,
}

/// Outcome of one action on one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitOutcome {
    /// The unit.
    pub unit: String,
    /// What was attempted.
    pub action: UnitAction,
    /// Whether it succeeded.
    pub success: bool,
    /// Failure detail, if any.
    pub error: Option<String>,
}

impl UnitOutcome {
    fn ok(unit: &str, action: UnitAction) -> Self {
        Self {
            unit: unit.to_string(),
            action,
            success: true,
            error: None,
        }
    }

    fn failed(unit: &str, action: UnitAction, error: &ReloadError) -> Self {
        Self {
            unit: unit.to_string(),
            action,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Combined result of one reload transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResult {
    /// Terminal status.
    pub status: TransactionStatus,
    /// The plan that was executed, in order.
    pub plan: Vec<String>,
    /// Per-unit outcomes in the order they were attempted (forward pass,
    /// then rollback pass).
    pub outcomes: Vec<UnitOutcome>,
    /// The error that stopped the forward pass, if any. For a partial
    /// rollback this is `PartiallyRolledBack`, naming every unit left in an
    /// unknown state; the triggering failure is in `outcomes`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReloadErrorDetail>,
}

/// Serializable error detail attached to a transaction result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadErrorDetail {
    /// The error, rendered.
    pub message: String,
    /// The unit that triggered the failure, when attributable.
    pub unit: Option<String>,
}

impl TransactionResult {
    /// Whether the whole plan was applied.
    pub fn is_committed(&self) -> bool {
        self.status == TransactionStatus::Committed
    }
}

/// Drives reload plans against the host, registry, and graph.
pub struct TransactionalExecutor {
    registry: Arc<UnitRegistry>,
    graph: Arc<DependencyGraph>,
    host: Arc<dyn ExtensionHost>,
    event_tx: broadcast::Sender<ReloadEvent>,
}

impl TransactionalExecutor {
    /// Create an executor over the given collaborators.
    pub fn new(
        registry: Arc<UnitRegistry>,
        graph: Arc<DependencyGraph>,
        host: Arc<dyn ExtensionHost>,
        event_tx: broadcast::Sender<ReloadEvent>,
    ) -> Self {
        Self {
            registry,
            graph,
            host,
            event_tx,
        }
    }

    /// Execute a plan to completion: committed, rolled back, or partially
    /// rolled back. Consumes the plan; a plan cannot run twice.
    pub async fn execute(&self, plan: ReloadPlan) -> TransactionResult {
        let start = Instant::now();
        let units = plan.into_units();

        info!("Executing reload plan: {:?}", units);
        let _ = self.event_tx.send(ReloadEvent::TransactionStarted {
            plan: units.clone(),
        });

        let mut snapshots: Vec<UnitSnapshot> = Vec::with_capacity(units.len());
        let mut outcomes: Vec<UnitOutcome> = Vec::new();
        let mut failure: Option<ReloadError> = None;

        for unit in &units {
            match self.reload_unit(unit, &mut snapshots).await {
                Ok(()) => {
                    debug!("Unit {} reloaded", unit);
                    outcomes.push(UnitOutcome::ok(unit, UnitAction::Reload));
                    let _ = self.event_tx.send(ReloadEvent::UnitReloaded {
                        unit: unit.clone(),
                    });
                }
                Err(err) => {
                    warn!("Unit {} failed to reload: {}", unit, err);
                    outcomes.push(UnitOutcome::failed(unit, UnitAction::Reload, &err));
                    let _ = self.event_tx.send(ReloadEvent::UnitFailed {
                        unit: unit.clone(),
                        error: err.to_string(),
                    });
                    failure = Some(err);
                    break;
                }
            }
        }

        let Some(trigger) = failure else {
            info!(
                "Reload transaction committed ({} units in {:?})",
                units.len(),
                start.elapsed()
            );
            let _ = self.event_tx.send(ReloadEvent::TransactionCommitted {
                plan: units.clone(),
                duration: start.elapsed(),
            });
            return TransactionResult {
                status: TransactionStatus::Committed,
                plan: units,
                outcomes,
                error: None,
            };
        };

        self.rollback(&units, snapshots, outcomes, trigger).await
    }

    /// Forward step for one unit: snapshot, unload old code, load new code,
    /// publish the new state and edge set.
    async fn reload_unit(
        &self,
        unit: &str,
        snapshots: &mut Vec<UnitSnapshot>,
    ) -> Result<(), ReloadError> {
        let record = self.registry.get(unit).await?;
        let dependencies = self.graph.dependencies_of(unit).await?;
        let was_loaded = self.host.is_loaded(unit).await;

        // Snapshot before touching anything, so a failure mid-step still
        // gets a restore attempt for this unit.
        snapshots.push(UnitSnapshot {
            unit: unit.to_string(),
            was_loaded,
            state: record.state.clone(),
            dependencies: dependencies.into_iter().collect(),
        });

        self.registry.set_state(unit, LoadState::Loading).await?;

        if was_loaded {
            self.host
                .unload(unit)
                .await
                .map_err(|e| ReloadError::UnloadFailure {
                    unit: unit.to_string(),
                    reason: e.reason,
                })?;
        }

        let outcome = self
            .host
            .load(unit)
            .await
            .map_err(|e| ReloadError::LoadFailure {
                unit: unit.to_string(),
                reason: e.reason,
            })?;

        // Refresh edges from the newly reported declarations before marking
        // the unit loaded. A dangling declaration fails the unit.
        self.graph
            .update_edges(unit, &outcome.declared_dependencies)
            .await?;

        self.registry
            .update(unit, |u| {
                u.discovered_dependencies = outcome.declared_dependencies.clone();
                if let Some(path) = &outcome.source_path {
                    u.source_path = Some(path.clone());
                }
                if record.state.is_loaded() || u.loaded_at.is_some() {
                    u.mark_reloaded();
                } else {
                    u.mark_loaded();
                }
            })
            .await?;

        Ok(())
    }

    /// Walk every snapshotted unit in reverse and restore it. Failures are
    /// recorded and the walk continues.
    async fn rollback(
        &self,
        plan: &[String],
        snapshots: Vec<UnitSnapshot>,
        mut outcomes: Vec<UnitOutcome>,
        trigger: ReloadError,
    ) -> TransactionResult {
        let to_restore: Vec<String> = snapshots.iter().rev().map(|s| s.unit.clone()).collect();
        warn!(
            "Rolling back reload transaction: {} (restoring {:?})",
            trigger, to_restore
        );
        let _ = self.event_tx.send(ReloadEvent::RollbackStarted {
            units: to_restore,
        });

        let mut failed_units: Vec<String> = Vec::new();
        let mut failed_reasons: Vec<String> = Vec::new();

        for snapshot in snapshots.iter().rev() {
            match self.restore_unit(snapshot).await {
                Ok(()) => {
                    debug!("Unit {} restored", snapshot.unit);
                    outcomes.push(UnitOutcome::ok(&snapshot.unit, UnitAction::Restore));
                    let _ = self.event_tx.send(ReloadEvent::UnitRestored {
                        unit: snapshot.unit.clone(),
                    });
                }
                Err(err) => {
                    error!("Failed to restore unit {}: {}", snapshot.unit, err);
                    outcomes.push(UnitOutcome::failed(&snapshot.unit, UnitAction::Restore, &err));
                    let _ = self
                        .registry
                        .set_state(&snapshot.unit, LoadState::Failed(err.to_string()))
                        .await;
                    failed_units.push(snapshot.unit.clone());
                    failed_reasons.push(err.to_string());
                }
            }
        }

        let trigger_unit = failing_unit(&trigger);

        if failed_units.is_empty() {
            info!("Rollback complete; system restored to pre-transaction state");
            let restored: Vec<String> = snapshots.iter().map(|s| s.unit.clone()).collect();
            let _ = self
                .event_tx
                .send(ReloadEvent::TransactionRolledBack { restored });
            TransactionResult {
                status: TransactionStatus::RolledBack,
                plan: plan.to_vec(),
                outcomes,
                error: Some(ReloadErrorDetail {
                    message: trigger.to_string(),
                    unit: trigger_unit,
                }),
            }
        } else {
            error!(
                "Partial rollback: units {:?} could not be restored; system may be inconsistent",
                failed_units
            );
            let _ = self
                .event_tx
                .send(ReloadEvent::TransactionPartiallyRolledBack {
                    failed: failed_units.clone(),
                });
            let partial = ReloadError::PartiallyRolledBack {
                units: failed_units,
                reasons: failed_reasons,
            };
            TransactionResult {
                status: TransactionStatus::PartiallyRolledBack,
                plan: plan.to_vec(),
                outcomes,
                error: Some(ReloadErrorDetail {
                    message: partial.to_string(),
                    unit: trigger_unit,
                }),
            }
        }
    }

    /// Restore one unit to its snapshot via the host primitives: drop the
    /// partially-applied new version, then bring back the previous one if it
    /// had been loaded.
    async fn restore_unit(&self, snapshot: &UnitSnapshot) -> Result<(), ReloadError> {
        let unit = snapshot.unit.as_str();

        if self.host.is_loaded(unit).await {
            self.host
                .unload(unit)
                .await
                .map_err(|e| ReloadError::UnloadFailure {
                    unit: unit.to_string(),
                    reason: e.reason,
                })?;
        }

        if snapshot.was_loaded {
            self.host
                .load(unit)
                .await
                .map_err(|e| ReloadError::LoadFailure {
                    unit: unit.to_string(),
                    reason: e.reason,
                })?;
        }

        self.graph.update_edges(unit, &snapshot.dependencies).await?;
        self.registry
            .update(unit, |u| u.state = snapshot.state.clone())
            .await?;

        Ok(())
    }
}

fn failing_unit(err: &ReloadError) -> Option<String> {
    match err {
        ReloadError::LoadFailure { unit, .. }
        | ReloadError::UnloadFailure { unit, .. }
        | ReloadError::DanglingDependency { unit, .. }
        | ReloadError::UnknownUnit(unit) => Some(unit.clone()),
        _ => None,
    }
}
