//! Host collaborator contract
//!
//! The engine never parses or binds extension code itself. It drives an
//! abstract host that owns the actual load/unload mechanism and reports the
//! dependency declarations it finds on a successful load. The engine's only
//! concern is the ordering and atomicity of these calls.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// What the host reports after successfully loading a unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadOutcome {
    /// Dependency names the loaded code declares or was observed to
    /// reference. The engine replaces the unit's graph edges with this set.
    pub declared_dependencies: Vec<String>,
    /// Source file backing the unit, if the host knows it.
    pub source_path: Option<PathBuf>,
}

impl LoadOutcome {
    /// Outcome with no dependencies.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Outcome declaring the given dependencies.
    pub fn with_dependencies<I, S>(deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            declared_dependencies: deps.into_iter().map(Into::into).collect(),
            source_path: None,
        }
    }

    /// Set the backing source path.
    pub fn with_source_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.source_path = Some(path.as_ref().to_path_buf());
        self
    }
}

/// A failure reported by the host for a single load or unload call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct HostFailure {
    /// Host-specific description of what went wrong.
    pub reason: String,
}

impl HostFailure {
    /// Create a failure with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The host's load/unload primitives, consumed by the engine.
///
/// Calls may block internally (e.g. touch the filesystem); the engine treats
/// each as one synchronous step and imposes no timeout of its own. Timeout
/// and cancellation policy belong to the implementor.
#[async_trait::async_trait]
pub trait ExtensionHost: Send + Sync {
    /// (Re)load a unit's code, returning its dependency declarations.
    async fn load(&self, unit: &str) -> Result<LoadOutcome, HostFailure>;

    /// Unload a unit's code.
    async fn unload(&self, unit: &str) -> Result<(), HostFailure>;

    /// Whether the unit is currently loaded in the host.
    async fn is_loaded(&self, unit: &str) -> bool;
}
