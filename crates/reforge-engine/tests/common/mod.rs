//! Scripted in-memory host for integration tests.
#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use reforge_engine::{ExtensionHost, HostFailure, LoadOutcome};

/// Install a test subscriber once per process so `RUST_LOG` works in tests.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Default)]
struct Inner {
    /// Dependencies reported on a successful load of each unit.
    declared: HashMap<String, Vec<String>>,
    /// Units currently loaded in the host.
    loaded: BTreeSet<String>,
    /// Scripted load results per unit, consumed FIFO; default success.
    load_script: HashMap<String, VecDeque<Result<(), String>>>,
    /// Scripted unload results per unit, consumed FIFO; default success.
    unload_script: HashMap<String, VecDeque<Result<(), String>>>,
    /// Artificial per-unit load latency.
    load_delay: HashMap<String, Duration>,
    /// Every host call, in order, e.g. "load a" / "unload b".
    calls: Vec<String>,
}

/// In-memory `ExtensionHost` with scripted failures and call recording.
#[derive(Default)]
pub struct MockHost {
    inner: Mutex<Inner>,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Set the dependencies the host reports when `unit` loads.
    pub fn declare(&self, unit: &str, deps: &[&str]) {
        let mut inner = self.inner.lock();
        inner
            .declared
            .insert(unit.to_string(), deps.iter().map(|d| d.to_string()).collect());
    }

    /// Script the results of the next `load` calls for `unit`.
    pub fn script_loads(&self, unit: &str, results: Vec<Result<(), &str>>) {
        let mut inner = self.inner.lock();
        inner.load_script.insert(
            unit.to_string(),
            results
                .into_iter()
                .map(|r| r.map_err(|e| e.to_string()))
                .collect(),
        );
    }

    /// Script the results of the next `unload` calls for `unit`.
    pub fn script_unloads(&self, unit: &str, results: Vec<Result<(), &str>>) {
        let mut inner = self.inner.lock();
        inner.unload_script.insert(
            unit.to_string(),
            results
                .into_iter()
                .map(|r| r.map_err(|e| e.to_string()))
                .collect(),
        );
    }

    /// Add artificial latency to `load` calls for `unit`.
    pub fn set_load_delay(&self, unit: &str, delay: Duration) {
        let mut inner = self.inner.lock();
        inner.load_delay.insert(unit.to_string(), delay);
    }

    /// Every host call so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }

    /// Units currently loaded in the host, sorted.
    pub fn loaded_units(&self) -> Vec<String> {
        self.inner.lock().loaded.iter().cloned().collect()
    }
}

#[async_trait]
impl ExtensionHost for MockHost {
    async fn load(&self, unit: &str) -> Result<LoadOutcome, HostFailure> {
        let delay = {
            let mut inner = self.inner.lock();
            inner.calls.push(format!("load {unit}"));
            inner.load_delay.get(unit).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock();
        let scripted = inner
            .load_script
            .get_mut(unit)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()));

        match scripted {
            Ok(()) => {
                inner.loaded.insert(unit.to_string());
                let deps = inner.declared.get(unit).cloned().unwrap_or_default();
                Ok(LoadOutcome::with_dependencies(deps))
            }
            Err(reason) => Err(HostFailure::new(reason)),
        }
    }

    async fn unload(&self, unit: &str) -> Result<(), HostFailure> {
        let mut inner = self.inner.lock();
        inner.calls.push(format!("unload {unit}"));

        let scripted = inner
            .unload_script
            .get_mut(unit)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()));

        match scripted {
            Ok(()) => {
                inner.loaded.remove(unit);
                Ok(())
            }
            Err(reason) => Err(HostFailure::new(reason)),
        }
    }

    async fn is_loaded(&self, unit: &str) -> bool {
        self.inner.lock().loaded.contains(unit)
    }
}
