//! Reload manager
//!
//! The engine's front door. Owns the registry, graph, analyzer, planner,
//! and executor, and enforces the single-writer discipline: exactly one
//! reload transaction in flight, with concurrent requests rejected
//! immediately as busy rather than interleaved.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{info, warn};

use reforge_kernel::{
    ExtensionHost, ExtensionUnit, LoadState, ReloadConfig, ReloadError, ReloadEvent,
    ReloadOptions, ReloadResult,
};

use crate::executor::{TransactionResult, TransactionalExecutor};
use crate::graph::DependencyGraph;
use crate::impact::ImpactAnalyzer;
use crate::planner::ReloadPlanner;
use crate::registry::{RegistryStats, UnitRegistry};

/// Read-only view of the registry and graph at a step boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// All units, sorted by name.
    pub units: Vec<ExtensionUnit>,
    /// All edges as `(dependent, dependency)` pairs, sorted.
    pub edges: Vec<(String, String)>,
    /// Registry statistics.
    pub loaded_units: usize,
    /// Units whose last load attempt failed.
    pub failed_units: usize,
}

/// Coordinates unit lifecycle and reload transactions.
pub struct ReloadManager {
    config: ReloadConfig,
    registry: Arc<UnitRegistry>,
    graph: Arc<DependencyGraph>,
    host: Arc<dyn ExtensionHost>,
    analyzer: ImpactAnalyzer,
    planner: ReloadPlanner,
    executor: TransactionalExecutor,
    event_tx: broadcast::Sender<ReloadEvent>,
    /// Held for the whole of one transaction; `try_lock` gives the
    /// immediate busy rejection.
    transaction_lock: Mutex<()>,
}

impl ReloadManager {
    /// Create a manager driving the given host.
    pub fn new(host: Arc<dyn ExtensionHost>, config: ReloadConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        let registry = Arc::new(UnitRegistry::new());
        let graph = Arc::new(DependencyGraph::new());

        Self {
            analyzer: ImpactAnalyzer::new(graph.clone()),
            planner: ReloadPlanner::new(graph.clone()),
            executor: TransactionalExecutor::new(
                registry.clone(),
                graph.clone(),
                host.clone(),
                event_tx.clone(),
            ),
            registry,
            graph,
            host,
            event_tx,
            transaction_lock: Mutex::new(()),
            config,
        }
    }

    /// Subscribe to reload events.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.event_tx.subscribe()
    }

    /// Sender half of the event channel, for wiring triggers (e.g. the
    /// source watcher) onto the same stream.
    pub fn event_sender(&self) -> broadcast::Sender<ReloadEvent> {
        self.event_tx.clone()
    }

    /// The unit registry.
    pub fn registry(&self) -> Arc<UnitRegistry> {
        self.registry.clone()
    }

    /// The dependency graph.
    pub fn graph(&self) -> Arc<DependencyGraph> {
        self.graph.clone()
    }

    /// The engine configuration.
    pub fn config(&self) -> &ReloadConfig {
        &self.config
    }

    /// Load a unit for the first time: register it, load it through the
    /// host, and install its reported dependency edges.
    ///
    /// Dependencies must already be registered; a dangling declaration is a
    /// reported configuration error and marks the unit failed. Callers that
    /// want placeholders register them beforehand.
    pub async fn load_unit(&self, name: &str) -> ReloadResult<()> {
        info!("Loading unit: {}", name);

        self.registry.register(ExtensionUnit::new(name)).await?;
        self.graph.add_node(name).await;
        self.registry.set_state(name, LoadState::Loading).await?;

        let outcome = match self.host.load(name).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = ReloadError::LoadFailure {
                    unit: name.to_string(),
                    reason: e.reason,
                };
                self.registry
                    .update(name, |u| u.mark_failed(&err.to_string()))
                    .await?;
                return Err(err);
            }
        };

        if let Err(err) = self
            .graph
            .update_edges(name, &outcome.declared_dependencies)
            .await
        {
            self.registry
                .update(name, |u| u.mark_failed(&err.to_string()))
                .await?;
            return Err(err);
        }

        self.registry
            .update(name, |u| {
                u.discovered_dependencies = outcome.declared_dependencies.clone();
                if let Some(path) = &outcome.source_path {
                    u.source_path = Some(path.clone());
                }
                u.mark_loaded();
            })
            .await?;

        Ok(())
    }

    /// Unload a unit. Refused while other loaded units still depend on it,
    /// so a load-bearing unit cannot be pulled out from under its
    /// dependents.
    pub async fn unload_unit(&self, name: &str) -> ReloadResult<()> {
        let unit = self.registry.get(name).await?;

        let mut loaded_dependents = Vec::new();
        for dependent in self.graph.dependents_of(name).await? {
            if self.registry.get(&dependent).await?.state.is_loaded() {
                loaded_dependents.push(dependent);
            }
        }
        if !loaded_dependents.is_empty() {
            return Err(ReloadError::UnloadFailure {
                unit: name.to_string(),
                reason: format!("still required by {}", loaded_dependents.join(", ")),
            });
        }

        if unit.state.is_loaded() || self.host.is_loaded(name).await {
            self.host
                .unload(name)
                .await
                .map_err(|e| ReloadError::UnloadFailure {
                    unit: name.to_string(),
                    reason: e.reason,
                })?;
        }

        self.registry.set_state(name, LoadState::Unloaded).await?;
        info!("Unloaded unit: {}", name);
        Ok(())
    }

    /// Unload a unit and then reap its now-orphaned dependencies: any
    /// dependency left with no loaded dependent is unloaded too,
    /// transitively. Returns the units unloaded, requested unit first.
    ///
    /// The initial unload is subject to the same dependent check as
    /// [`unload_unit`](Self::unload_unit).
    pub async fn unload_unit_cascade(&self, name: &str) -> ReloadResult<Vec<String>> {
        self.unload_unit(name).await?;

        let mut unloaded = vec![name.to_string()];
        let mut queue: VecDeque<String> =
            self.graph.dependencies_of(name).await?.into_iter().collect();

        while let Some(dep) = queue.pop_front() {
            if !self.registry.get(&dep).await?.state.is_loaded() {
                continue;
            }

            let mut still_needed = false;
            for dependent in self.graph.dependents_of(&dep).await? {
                if self.registry.get(&dependent).await?.state.is_loaded() {
                    still_needed = true;
                    break;
                }
            }
            if still_needed {
                continue;
            }

            info!("Unloading orphaned dependency: {}", dep);
            self.unload_unit(&dep).await?;
            unloaded.push(dep.clone());

            for next in self.graph.dependencies_of(&dep).await? {
                queue.push_back(next);
            }
        }

        Ok(unloaded)
    }

    /// Remove a unit from the registry and graph entirely. The unit must be
    /// unloaded first and must have no remaining dependents.
    pub async fn unregister_unit(&self, name: &str) -> ReloadResult<ExtensionUnit> {
        let unit = self.registry.get(name).await?;

        if unit.state.is_loaded() {
            return Err(ReloadError::UnloadFailure {
                unit: name.to_string(),
                reason: "unit is still loaded".to_string(),
            });
        }

        let dependents = self.graph.dependents_of(name).await?;
        if !dependents.is_empty() {
            return Err(ReloadError::UnloadFailure {
                unit: name.to_string(),
                reason: format!(
                    "still required by {}",
                    dependents.into_iter().collect::<Vec<_>>().join(", ")
                ),
            });
        }

        self.graph.remove_node(name).await?;
        self.registry.unregister(name).await
    }

    /// Run one reload transaction for the given changed units, with the
    /// engine-wide default options.
    pub async fn request_reload(&self, changed: &[String]) -> ReloadResult<TransactionResult> {
        let options = ReloadOptions {
            allow_cycle_fallback: self.config.allow_cycle_fallback,
        };
        self.request_reload_with(changed, options).await
    }

    /// Run one reload transaction with explicit per-request options.
    ///
    /// Fails fast, before any host call, with:
    /// - `Busy` if a transaction is already in flight;
    /// - `UnknownUnit` if a changed name is not registered;
    /// - `CyclicDependency` if the impact set is cyclic and the fallback
    ///   was not requested.
    ///
    /// Otherwise returns the transaction result: committed, rolled back, or
    /// partially rolled back.
    pub async fn request_reload_with(
        &self,
        changed: &[String],
        options: ReloadOptions,
    ) -> ReloadResult<TransactionResult> {
        let Ok(_guard) = self.transaction_lock.try_lock() else {
            warn!("Reload request rejected: transaction already executing");
            return Err(ReloadError::Busy);
        };

        info!("Reload requested for {:?}", changed);

        let impact = self.analyzer.impacted_by(changed).await?;
        let plan = match self.planner.plan(&impact).await {
            Ok(plan) => plan,
            Err(ReloadError::CyclicDependency(members)) if options.allow_cycle_fallback => {
                warn!(
                    "Impact set contains cycle {:?}; proceeding unordered by explicit request",
                    members
                );
                self.planner.plan_unordered(&impact)
            }
            Err(err) => return Err(err),
        };

        Ok(self.executor.execute(plan).await)
    }

    /// Read-only snapshot of registry and graph state. Safe to call while a
    /// transaction is executing: state is only published at step boundaries,
    /// so the view is always consistent.
    pub async fn status(&self) -> StatusSnapshot {
        let units = self.registry.all().await;
        let edges = self.graph.edges().await;
        let RegistryStats {
            loaded_units,
            failed_units,
            ..
        } = self.registry.stats().await;

        StatusSnapshot {
            units,
            edges,
            loaded_units,
            failed_units,
        }
    }
}
