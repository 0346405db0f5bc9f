//! Unit lifecycle through the manager: initial loads, safe unload,
//! unregistration, status reporting, and event publication.

mod common;

use common::MockHost;
use reforge_engine::{
    LoadState, ReloadConfig, ReloadError, ReloadEvent, ReloadManager, TransactionStatus,
};

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_load_unit_registers_and_installs_edges() {
    let host = MockHost::new();
    host.declare("b", &["a"]);

    let manager = ReloadManager::new(host.clone(), ReloadConfig::default());
    manager.load_unit("a").await.unwrap();
    manager.load_unit("b").await.unwrap();

    let status = manager.status().await;
    assert_eq!(status.loaded_units, 2);
    assert_eq!(status.edges, vec![("b".to_string(), "a".to_string())]);

    let b = status.units.iter().find(|u| u.name == "b").unwrap();
    assert_eq!(b.state, LoadState::Loaded);
    assert_eq!(b.discovered_dependencies, strings(&["a"]));
}

#[tokio::test]
async fn test_load_unit_twice_is_duplicate() {
    let host = MockHost::new();
    let manager = ReloadManager::new(host, ReloadConfig::default());

    manager.load_unit("a").await.unwrap();
    let err = manager.load_unit("a").await.unwrap_err();

    assert_eq!(err, ReloadError::DuplicateUnit("a".to_string()));
}

#[tokio::test]
async fn test_dangling_declaration_fails_the_load() {
    let host = MockHost::new();
    host.declare("b", &["a"]);

    let manager = ReloadManager::new(host, ReloadConfig::default());

    // `a` was never registered; loading `b` must report the missing
    // dependency, not silently drop the edge.
    let err = manager.load_unit("b").await.unwrap_err();
    assert_eq!(
        err,
        ReloadError::DanglingDependency {
            unit: "b".to_string(),
            dependency: "a".to_string(),
        }
    );

    let status = manager.status().await;
    assert_eq!(status.failed_units, 1);
}

#[tokio::test]
async fn test_unload_refused_while_dependents_loaded() {
    let host = MockHost::new();
    host.declare("b", &["a"]);

    let manager = ReloadManager::new(host.clone(), ReloadConfig::default());
    manager.load_unit("a").await.unwrap();
    manager.load_unit("b").await.unwrap();

    let err = manager.unload_unit("a").await.unwrap_err();
    match err {
        ReloadError::UnloadFailure { unit, reason } => {
            assert_eq!(unit, "a");
            assert!(reason.contains("b"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Leaf-first unload works.
    manager.unload_unit("b").await.unwrap();
    manager.unload_unit("a").await.unwrap();
    assert!(host.loaded_units().is_empty());
}

#[tokio::test]
async fn test_cascade_unload_reaps_only_orphaned_dependencies() {
    let host = MockHost::new();
    host.declare("b", &["a"]);
    host.declare("c", &["a"]);

    let manager = ReloadManager::new(host.clone(), ReloadConfig::default());
    manager.load_unit("a").await.unwrap();
    manager.load_unit("b").await.unwrap();
    manager.load_unit("c").await.unwrap();

    // The entry point is still subject to the dependent check.
    assert!(manager.unload_unit_cascade("a").await.is_err());

    // a stays: c still needs it.
    let unloaded = manager.unload_unit_cascade("b").await.unwrap();
    assert_eq!(unloaded, strings(&["b"]));
    assert_eq!(host.loaded_units(), strings(&["a", "c"]));

    // Now a is orphaned and goes with c.
    let unloaded = manager.unload_unit_cascade("c").await.unwrap();
    assert_eq!(unloaded, strings(&["c", "a"]));
    assert!(host.loaded_units().is_empty());
}

#[tokio::test]
async fn test_cascade_unload_walks_transitively() {
    let host = MockHost::new();
    host.declare("b", &["a"]);
    host.declare("c", &["b"]);

    let manager = ReloadManager::new(host.clone(), ReloadConfig::default());
    manager.load_unit("a").await.unwrap();
    manager.load_unit("b").await.unwrap();
    manager.load_unit("c").await.unwrap();

    let unloaded = manager.unload_unit_cascade("c").await.unwrap();
    assert_eq!(unloaded, strings(&["c", "b", "a"]));
    assert!(host.loaded_units().is_empty());

    let status = manager.status().await;
    assert_eq!(status.loaded_units, 0);
    // Records and edges survive; only load state changed.
    assert_eq!(status.units.len(), 3);
}

#[tokio::test]
async fn test_unregister_requires_unloaded_and_unreferenced() {
    let host = MockHost::new();
    host.declare("b", &["a"]);

    let manager = ReloadManager::new(host, ReloadConfig::default());
    manager.load_unit("a").await.unwrap();
    manager.load_unit("b").await.unwrap();

    // Still loaded.
    assert!(manager.unregister_unit("b").await.is_err());

    manager.unload_unit("b").await.unwrap();
    manager.unload_unit("a").await.unwrap();

    // `b` still holds an edge onto `a`.
    assert!(manager.unregister_unit("a").await.is_err());

    manager.unregister_unit("b").await.unwrap();
    manager.unregister_unit("a").await.unwrap();

    let status = manager.status().await;
    assert!(status.units.is_empty());
    assert!(status.edges.is_empty());
}

#[tokio::test]
async fn test_events_published_at_step_boundaries() {
    let host = MockHost::new();
    host.declare("b", &["a"]);

    let manager = ReloadManager::new(host, ReloadConfig::default());
    manager.load_unit("a").await.unwrap();
    manager.load_unit("b").await.unwrap();

    let mut events = manager.subscribe();
    let result = manager.request_reload(&strings(&["a"])).await.unwrap();
    assert_eq!(result.status, TransactionStatus::Committed);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    assert!(matches!(
        seen.first(),
        Some(ReloadEvent::TransactionStarted { plan }) if *plan == strings(&["a", "b"])
    ));
    assert!(
        seen.iter()
            .any(|e| matches!(e, ReloadEvent::UnitReloaded { unit } if unit == "a"))
    );
    assert!(matches!(
        seen.last(),
        Some(ReloadEvent::TransactionCommitted { .. })
    ));
}

#[tokio::test]
async fn test_rollback_events_name_restored_units() {
    let host = MockHost::new();
    host.declare("b", &["a"]);

    let manager = ReloadManager::new(host.clone(), ReloadConfig::default());
    manager.load_unit("a").await.unwrap();
    manager.load_unit("b").await.unwrap();

    host.script_loads("b", vec![Err("boom"), Ok(())]);

    let mut events = manager.subscribe();
    let result = manager.request_reload(&strings(&["a"])).await.unwrap();
    assert_eq!(result.status, TransactionStatus::RolledBack);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    assert!(
        seen.iter()
            .any(|e| matches!(e, ReloadEvent::UnitFailed { unit, .. } if unit == "b"))
    );
    assert!(
        seen.iter()
            .any(|e| matches!(e, ReloadEvent::RollbackStarted { units } if *units == strings(&["b", "a"])))
    );
    assert!(matches!(
        seen.last(),
        Some(ReloadEvent::TransactionRolledBack { restored }) if *restored == strings(&["a", "b"])
    ));
}

#[tokio::test]
async fn test_status_snapshot_serializes() {
    let host = MockHost::new();
    let manager = ReloadManager::new(host, ReloadConfig::default());
    manager.load_unit("a").await.unwrap();

    let status = manager.status().await;
    let json = serde_json::to_string(&status).unwrap();
    assert!(json.contains("\"a\""));
}
