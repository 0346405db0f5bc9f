//! Extension unit model
//!
//! An extension unit is one independently reloadable code module known to
//! the host, identified by a stable dotted name.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Load state of an extension unit.
///
/// Transitions are driven exclusively by the transactional executor and the
/// manager's load/unload paths; nothing else mutates unit state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LoadState {
    /// Not loaded.
    #[default]
    Unloaded,
    /// Load or reload in progress.
    Loading,
    /// Loaded and current.
    Loaded,
    /// The last load or reload attempt failed.
    Failed(String),
}

impl LoadState {
    /// Whether the unit is currently loaded.
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadState::Loaded)
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadState::Unloaded => write!(f, "Unloaded"),
            LoadState::Loading => write!(f, "Loading"),
            LoadState::Loaded => write!(f, "Loaded"),
            LoadState::Failed(err) => write!(f, "Failed: {}", err),
        }
    }
}

/// An extension unit tracked by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionUnit {
    /// Stable unique identifier (e.g. a dotted module path).
    pub name: String,
    /// Current load state.
    pub state: LoadState,
    /// Dependencies the unit declares explicitly.
    pub declared_dependencies: Vec<String>,
    /// Dependencies discovered by the host's reference analysis on load.
    pub discovered_dependencies: Vec<String>,
    /// Source file backing this unit, if the host reports one. Used by the
    /// watcher trigger to map file changes back to unit names.
    pub source_path: Option<PathBuf>,
    /// First load timestamp (unix seconds).
    pub loaded_at: Option<u64>,
    /// Last successful reload timestamp (unix seconds).
    pub last_reload: Option<u64>,
    /// Number of successful reloads.
    pub reload_count: u32,
}

impl ExtensionUnit {
    /// Create a new, unloaded unit.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: LoadState::Unloaded,
            declared_dependencies: Vec::new(),
            discovered_dependencies: Vec::new(),
            source_path: None,
            loaded_at: None,
            last_reload: None,
            reload_count: 0,
        }
    }

    /// Add a declared dependency.
    pub fn with_dependency(mut self, dep: &str) -> Self {
        self.declared_dependencies.push(dep.to_string());
        self
    }

    /// Set the backing source path.
    pub fn with_source_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.source_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// All dependencies, declared first, discovered after, deduplicated.
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps = self.declared_dependencies.clone();
        for dep in &self.discovered_dependencies {
            if !deps.contains(dep) {
                deps.push(dep.clone());
            }
        }
        deps
    }

    /// Mark as loaded for the first time.
    pub fn mark_loaded(&mut self) {
        debug!("Unit {} loaded", self.name);
        self.state = LoadState::Loaded;
        self.loaded_at = Some(now_secs());
    }

    /// Mark as reloaded.
    pub fn mark_reloaded(&mut self) {
        self.state = LoadState::Loaded;
        self.last_reload = Some(now_secs());
        self.reload_count += 1;
        debug!("Unit {} reloaded (count {})", self.name, self.reload_count);
    }

    /// Mark the last load attempt as failed.
    pub fn mark_failed(&mut self, reason: &str) {
        warn!("Unit {} failed: {}", self.name, reason);
        self.state = LoadState::Failed(reason.to_string());
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
