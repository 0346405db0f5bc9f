//! Unit registry
//!
//! The single source of truth for which extension units exist and what load
//! state each is in. The registry holds no reload logic; every other
//! component consults it and only the executor/manager paths mutate it.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use reforge_kernel::{ExtensionUnit, LoadState, ReloadError, ReloadResult};

/// Registry of known extension units.
pub struct UnitRegistry {
    units: Arc<RwLock<HashMap<String, ExtensionUnit>>>,
}

impl UnitRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            units: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a unit. Fails with `DuplicateUnit` if the name is taken.
    pub async fn register(&self, unit: ExtensionUnit) -> ReloadResult<()> {
        let name = unit.name.clone();
        let mut units = self.units.write().await;

        if units.contains_key(&name) {
            return Err(ReloadError::DuplicateUnit(name));
        }

        info!("Registering unit: {}", name);
        units.insert(name, unit);
        Ok(())
    }

    /// Remove a unit, returning its final record.
    pub async fn unregister(&self, name: &str) -> ReloadResult<ExtensionUnit> {
        let mut units = self.units.write().await;

        let unit = units
            .remove(name)
            .ok_or_else(|| ReloadError::UnknownUnit(name.to_string()))?;

        info!("Unregistered unit: {}", name);
        Ok(unit)
    }

    /// Get a unit's current record.
    pub async fn get(&self, name: &str) -> ReloadResult<ExtensionUnit> {
        let units = self.units.read().await;
        units
            .get(name)
            .cloned()
            .ok_or_else(|| ReloadError::UnknownUnit(name.to_string()))
    }

    /// Whether a unit is registered.
    pub async fn contains(&self, name: &str) -> bool {
        let units = self.units.read().await;
        units.contains_key(name)
    }

    /// All registered units, sorted by name.
    pub async fn all(&self) -> Vec<ExtensionUnit> {
        let units = self.units.read().await;
        let mut all: Vec<_> = units.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// All registered unit names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let units = self.units.read().await;
        let mut names: Vec<_> = units.keys().cloned().collect();
        names.sort();
        names
    }

    /// Update a unit's load state.
    pub async fn set_state(&self, name: &str, state: LoadState) -> ReloadResult<()> {
        let mut units = self.units.write().await;

        let unit = units
            .get_mut(name)
            .ok_or_else(|| ReloadError::UnknownUnit(name.to_string()))?;

        debug!("Unit {} state: {} -> {}", name, unit.state, state);
        unit.state = state;
        Ok(())
    }

    /// Apply a closure to a unit's record under the write lock.
    pub async fn update<F>(&self, name: &str, f: F) -> ReloadResult<()>
    where
        F: FnOnce(&mut ExtensionUnit),
    {
        let mut units = self.units.write().await;

        let unit = units
            .get_mut(name)
            .ok_or_else(|| ReloadError::UnknownUnit(name.to_string()))?;

        f(unit);
        Ok(())
    }

    /// Units currently in the given state.
    pub async fn in_state(&self, state: &LoadState) -> Vec<ExtensionUnit> {
        let units = self.units.read().await;
        let mut found: Vec<_> = units.values().filter(|u| &u.state == state).cloned().collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    /// Registry statistics.
    pub async fn stats(&self) -> RegistryStats {
        let units = self.units.read().await;

        let mut stats = RegistryStats {
            total_units: units.len(),
            ..RegistryStats::default()
        };

        for unit in units.values() {
            match unit.state {
                LoadState::Loaded => stats.loaded_units += 1,
                LoadState::Failed(_) => stats.failed_units += 1,
                _ => {}
            }
            stats.total_reloads += unit.reload_count as usize;
        }

        stats
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Total registered units.
    pub total_units: usize,
    /// Units currently loaded.
    pub loaded_units: usize,
    /// Units whose last load attempt failed.
    pub failed_units: usize,
    /// Successful reloads across all units.
    pub total_reloads: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = UnitRegistry::new();

        registry
            .register(ExtensionUnit::new("app.db"))
            .await
            .unwrap();

        assert!(registry.contains("app.db").await);
        assert!(!registry.contains("app.web").await);

        let unit = registry.get("app.db").await.unwrap();
        assert_eq!(unit.name, "app.db");
        assert_eq!(unit.state, LoadState::Unloaded);
    }

    #[tokio::test]
    async fn test_duplicate_register() {
        let registry = UnitRegistry::new();

        registry.register(ExtensionUnit::new("a")).await.unwrap();
        let err = registry.register(ExtensionUnit::new("a")).await.unwrap_err();

        assert_eq!(err, ReloadError::DuplicateUnit("a".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_unit() {
        let registry = UnitRegistry::new();

        assert_eq!(
            registry.get("ghost").await.unwrap_err(),
            ReloadError::UnknownUnit("ghost".to_string())
        );
        assert_eq!(
            registry.set_state("ghost", LoadState::Loaded).await.unwrap_err(),
            ReloadError::UnknownUnit("ghost".to_string())
        );
        assert_eq!(
            registry.unregister("ghost").await.unwrap_err(),
            ReloadError::UnknownUnit("ghost".to_string())
        );
    }

    #[tokio::test]
    async fn test_set_state_and_stats() {
        let registry = UnitRegistry::new();

        registry.register(ExtensionUnit::new("a")).await.unwrap();
        registry.register(ExtensionUnit::new("b")).await.unwrap();

        registry.set_state("a", LoadState::Loaded).await.unwrap();
        registry
            .set_state("b", LoadState::Failed("boom".to_string()))
            .await
            .unwrap();

        let stats = registry.stats().await;
        assert_eq!(stats.total_units, 2);
        assert_eq!(stats.loaded_units, 1);
        assert_eq!(stats.failed_units, 1);
    }

    #[tokio::test]
    async fn test_all_sorted() {
        let registry = UnitRegistry::new();

        registry.register(ExtensionUnit::new("c")).await.unwrap();
        registry.register(ExtensionUnit::new("a")).await.unwrap();
        registry.register(ExtensionUnit::new("b")).await.unwrap();

        let names = registry.names().await;
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
