//! Transactional hot-reload engine for extension units
//!
//! Provides the machinery to refresh a subset of a running process's
//! extension units without restarting it:
//! - Unit registry as the single source of truth for load state
//! - Dependency graph built from host-reported declarations
//! - Impact analysis (which units must reload in response to a change)
//! - Deterministic, dependency-ordered reload planning with cycle detection
//! - Transactional execution with snapshot-based rollback
//! - File watcher trigger that maps source changes to reload requests
//!
//! Either a reload plan fully commits, or every already-processed unit is
//! restored to its pre-transaction state. The one remaining failure mode,
//! a partial rollback, is reported loudly rather than swallowed.

mod executor;
mod graph;
mod impact;
mod manager;
mod planner;
mod registry;
mod watcher;

pub use executor::{
    ReloadErrorDetail, TransactionResult, TransactionStatus, TransactionalExecutor, UnitAction,
    UnitOutcome, UnitSnapshot,
};
pub use graph::DependencyGraph;
pub use impact::{ImpactAnalyzer, ImpactSet};
pub use manager::{ReloadManager, StatusSnapshot};
pub use planner::{ReloadPlan, ReloadPlanner};
pub use registry::{RegistryStats, UnitRegistry};
pub use watcher::{SourceWatcher, WatchConfig};

// Re-export the kernel contracts so engine users need a single import.
pub use reforge_kernel::{
    ExtensionHost, ExtensionUnit, HostFailure, LoadOutcome, LoadState, ReloadConfig, ReloadError,
    ReloadEvent, ReloadOptions, ReloadResult, ReloadStrategy,
};
