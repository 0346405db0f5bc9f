//! Reload planner
//!
//! Turns an impact set into a linear reload order: a topological sort of the
//! impact set against the dependency graph restricted to that set, so that
//! every dependency reloads before its dependents. Ties are broken by
//! ascending unit name, which makes planning fully deterministic. Cycles are
//! detected and reported with their member units; the planner never breaks
//! a cycle on its own.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use reforge_kernel::{ReloadError, ReloadResult};

use crate::graph::DependencyGraph;
use crate::impact::ImpactSet;

/// An ordered sequence of units to reload.
///
/// Immutable once constructed; the executor consumes it by value, so a plan
/// is executed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadPlan {
    units: Vec<String>,
    unordered: bool,
}

impl ReloadPlan {
    /// Units in reload order.
    pub fn units(&self) -> &[String] {
        &self.units
    }

    /// Whether this is an unordered best-effort plan of a cyclic group.
    pub fn is_unordered(&self) -> bool {
        self.unordered
    }

    /// Number of units in the plan.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the plan is empty.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub(crate) fn into_units(self) -> Vec<String> {
        self.units
    }
}

/// Plans reload order against the dependency graph.
pub struct ReloadPlanner {
    graph: Arc<DependencyGraph>,
}

impl ReloadPlanner {
    /// Create a planner over the given graph.
    pub fn new(graph: Arc<DependencyGraph>) -> Self {
        Self { graph }
    }

    /// Compute a dependency-ordered plan for the impact set.
    ///
    /// Kahn's algorithm over the restricted subgraph, with an ordered ready
    /// set: among units with no remaining constraint the smallest name goes
    /// first. Fails with `CyclicDependency` naming the cycle members if the
    /// restricted subgraph is cyclic.
    pub async fn plan(&self, impact: &ImpactSet) -> ReloadResult<ReloadPlan> {
        let set: BTreeSet<String> = impact.units().iter().cloned().collect();

        // Restricted adjacency: only edges with both endpoints in the set.
        let mut deps_in_set: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut dependents_in_set: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for unit in &set {
            let deps: BTreeSet<String> = self
                .graph
                .dependencies_of(unit)
                .await?
                .into_iter()
                .filter(|d| set.contains(d))
                .collect();

            for dep in &deps {
                dependents_in_set
                    .entry(dep.clone())
                    .or_default()
                    .insert(unit.clone());
            }
            deps_in_set.insert(unit.clone(), deps);
        }

        // Ready set: units with no unmet dependency, ordered by name.
        let mut in_degree: BTreeMap<String, usize> = deps_in_set
            .iter()
            .map(|(unit, deps)| (unit.clone(), deps.len()))
            .collect();

        let mut ready: BTreeSet<String> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(unit, _)| unit.clone())
            .collect();

        let mut order: Vec<String> = Vec::with_capacity(set.len());

        while let Some(unit) = ready.iter().next().cloned() {
            ready.remove(&unit);
            order.push(unit.clone());

            if let Some(dependents) = dependents_in_set.get(&unit) {
                for dependent in dependents {
                    let deg = in_degree
                        .get_mut(dependent)
                        .ok_or_else(|| ReloadError::Internal("planner bookkeeping".into()))?;
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(dependent.clone());
                    }
                }
            }
        }

        if order.len() != set.len() {
            let placed: BTreeSet<&String> = order.iter().collect();
            let remaining: BTreeSet<String> = set
                .iter()
                .filter(|u| !placed.contains(u))
                .cloned()
                .collect();
            let members = cycle_members(&remaining, &deps_in_set);
            return Err(ReloadError::CyclicDependency(members));
        }

        debug!("Planned reload order: {:?}", order);
        Ok(ReloadPlan {
            units: order,
            unordered: false,
        })
    }

    /// Best-effort unordered plan: the impact set sorted by name, with no
    /// dependency ordering guarantee. Only for callers that explicitly opt
    /// in after `plan` reported a cycle.
    pub fn plan_unordered(&self, impact: &ImpactSet) -> ReloadPlan {
        let mut units: Vec<String> = impact.units().to_vec();
        units.sort();
        units.dedup();

        ReloadPlan {
            units,
            unordered: true,
        }
    }
}

/// Strip residue from the unresolved remainder of a failed topological sort.
///
/// The remainder holds the cycle members plus units that merely depend on a
/// cycle. Repeatedly peeling units that no remaining unit depends on leaves
/// exactly the union of the cycles.
fn cycle_members(
    remaining: &BTreeSet<String>,
    deps_in_set: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<String> {
    let mut members: BTreeSet<String> = remaining.clone();

    loop {
        let depended_on: BTreeSet<&String> = members
            .iter()
            .flat_map(|unit| {
                deps_in_set
                    .get(unit)
                    .into_iter()
                    .flatten()
                    .filter(|d| members.contains(*d))
            })
            .collect();

        let peel: Vec<String> = members
            .iter()
            .filter(|unit| !depended_on.contains(unit))
            .cloned()
            .collect();

        if peel.is_empty() {
            break;
        }
        for unit in peel {
            members.remove(&unit);
        }
    }

    members.into_iter().collect()
}
