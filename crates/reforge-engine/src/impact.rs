//! Impact analyzer
//!
//! Computes which units must reload in response to a change: the changed
//! units themselves plus everything transitively reachable by following
//! dependents. A unit must be reloaded not only when its own source changes
//! but whenever anything it depends on reloads, because its bound references
//! may otherwise point at stale code.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

use reforge_kernel::ReloadResult;

use crate::graph::DependencyGraph;

/// The set of units that must reload for one change event.
///
/// Iteration order is the deterministic discovery order: changed units
/// (sorted) first, then their dependents breadth-first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpactSet {
    units: Vec<String>,
}

impl ImpactSet {
    /// Units in discovery order.
    pub fn units(&self) -> &[String] {
        &self.units
    }

    /// Whether the set contains a unit.
    pub fn contains(&self, unit: &str) -> bool {
        self.units.iter().any(|u| u == unit)
    }

    /// Number of impacted units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Computes transitive closures of dependents over the dependency graph.
pub struct ImpactAnalyzer {
    graph: Arc<DependencyGraph>,
}

impl ImpactAnalyzer {
    /// Create an analyzer over the given graph.
    pub fn new(graph: Arc<DependencyGraph>) -> Self {
        Self { graph }
    }

    /// Compute the full impact set for the given changed units.
    ///
    /// Breadth-first over `dependents_of`, with a visited set so mutual
    /// dependencies cannot loop. Fails with `UnknownUnit` if a changed name
    /// is not in the graph.
    pub async fn impacted_by(&self, changed: &[String]) -> ReloadResult<ImpactSet> {
        // Sorted, deduplicated seeds keep the result deterministic.
        let seeds: BTreeSet<String> = changed.iter().cloned().collect();

        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut order: Vec<String> = Vec::new();
        let mut queue: VecDeque<String> = VecDeque::new();

        for seed in &seeds {
            // Surfaces UnknownUnit for unregistered seeds.
            self.graph.dependents_of(seed).await?;

            if visited.insert(seed.clone()) {
                order.push(seed.clone());
                queue.push_back(seed.clone());
            }
        }

        while let Some(unit) = queue.pop_front() {
            // BTreeSet iteration gives the sorted frontier.
            for dependent in self.graph.dependents_of(&unit).await? {
                if visited.insert(dependent.clone()) {
                    order.push(dependent.clone());
                    queue.push_back(dependent);
                }
            }
        }

        debug!("Impact of {:?}: {:?}", seeds, order);
        Ok(ImpactSet { units: order })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reforge_kernel::ReloadError;

    async fn chain_graph() -> Arc<DependencyGraph> {
        // a <- b <- c (b depends on a, c depends on b)
        let graph = Arc::new(DependencyGraph::new());
        for name in ["a", "b", "c"] {
            graph.add_node(name).await;
        }
        graph.update_edges("b", &["a".to_string()]).await.unwrap();
        graph.update_edges("c", &["b".to_string()]).await.unwrap();
        graph
    }

    #[tokio::test]
    async fn test_impact_includes_transitive_dependents() {
        let graph = chain_graph().await;
        let analyzer = ImpactAnalyzer::new(graph);

        let impact = analyzer.impacted_by(&["a".to_string()]).await.unwrap();
        assert_eq!(impact.units(), &["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_impact_of_leaf_is_itself() {
        let graph = chain_graph().await;
        let analyzer = ImpactAnalyzer::new(graph);

        let impact = analyzer.impacted_by(&["c".to_string()]).await.unwrap();
        assert_eq!(impact.units(), &["c"]);
    }

    #[tokio::test]
    async fn test_impact_mid_chain() {
        let graph = chain_graph().await;
        let analyzer = ImpactAnalyzer::new(graph);

        let impact = analyzer.impacted_by(&["b".to_string()]).await.unwrap();
        assert_eq!(impact.units(), &["b", "c"]);
        assert!(!impact.contains("a"));
    }

    #[tokio::test]
    async fn test_impact_cycle_safe() {
        // a <-> b mutual dependency must not loop forever.
        let graph = Arc::new(DependencyGraph::new());
        graph.add_node("a").await;
        graph.add_node("b").await;
        graph.update_edges("a", &["b".to_string()]).await.unwrap();
        graph.update_edges("b", &["a".to_string()]).await.unwrap();

        let analyzer = ImpactAnalyzer::new(graph);
        let impact = analyzer.impacted_by(&["a".to_string()]).await.unwrap();

        assert_eq!(impact.units(), &["a", "b"]);
    }

    #[tokio::test]
    async fn test_impact_multiple_seeds_dedup() {
        let graph = chain_graph().await;
        let analyzer = ImpactAnalyzer::new(graph);

        let impact = analyzer
            .impacted_by(&["b".to_string(), "a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(impact.units(), &["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_impact_unknown_seed() {
        let graph = chain_graph().await;
        let analyzer = ImpactAnalyzer::new(graph);

        let err = analyzer.impacted_by(&["ghost".to_string()]).await.unwrap_err();
        assert_eq!(err, ReloadError::UnknownUnit("ghost".to_string()));
    }
}
