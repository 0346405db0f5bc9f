//! Source watcher trigger
//!
//! Watches the source files backing registered units and turns filesystem
//! changes into batches of changed unit names, debounced so a burst of
//! writes produces one reload request. This is a trigger collaborator
//! layered on top of the core: it only ever feeds
//! [`ReloadManager::request_reload`](crate::ReloadManager::request_reload)
//! and holds no reload logic itself.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::{debug, info, warn};

use reforge_kernel::{ReloadEvent, ReloadStrategy};

/// Watcher configuration.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Coalescing window: changes arriving within this window of each other
    /// are batched into one reload request.
    pub debounce: Duration,
    /// Whether automatic triggering is enabled at all. Disabled under the
    /// manual reload strategy.
    pub enabled: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            enabled: true,
        }
    }
}

impl WatchConfig {
    /// Derive a watch configuration from a reload strategy.
    pub fn from_strategy(strategy: &ReloadStrategy) -> Self {
        match strategy {
            ReloadStrategy::Immediate => Self {
                debounce: Duration::ZERO,
                enabled: true,
            },
            ReloadStrategy::Debounced(window) => Self {
                debounce: *window,
                enabled: true,
            },
            ReloadStrategy::Manual => Self {
                debounce: Duration::ZERO,
                enabled: false,
            },
            _ => Self::default(),
        }
    }

    /// Set the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Maps source-file changes to batches of changed unit names.
pub struct SourceWatcher {
    config: WatchConfig,
    /// Canonical source path -> unit name.
    path_to_unit: Arc<RwLock<HashMap<PathBuf, String>>>,
    /// Directories already registered with the notify backend.
    watched_dirs: Vec<PathBuf>,
    batch_tx: mpsc::Sender<Vec<String>>,
    batch_rx: Option<mpsc::Receiver<Vec<String>>>,
    event_tx: Option<broadcast::Sender<ReloadEvent>>,
    watcher: Option<RecommendedWatcher>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl SourceWatcher {
    /// Create a new watcher.
    pub fn new(config: WatchConfig) -> Self {
        let (batch_tx, batch_rx) = mpsc::channel(64);

        Self {
            config,
            path_to_unit: Arc::new(RwLock::new(HashMap::new())),
            watched_dirs: Vec::new(),
            batch_tx,
            batch_rx: Some(batch_rx),
            event_tx: None,
            watcher: None,
            shutdown_tx: None,
        }
    }

    /// Also publish a `UnitChanged` event per observed change on the given
    /// channel (typically the reload manager's event channel).
    pub fn with_event_sender(mut self, tx: broadcast::Sender<ReloadEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Take the batch receiver. Each received batch is a sorted set of unit
    /// names ready to hand to `request_reload`. Can only be taken once.
    pub fn take_batch_receiver(&mut self) -> Option<mpsc::Receiver<Vec<String>>> {
        self.batch_rx.take()
    }

    /// Track a unit's source file. The file's parent directory is watched
    /// (non-recursively), so editors that replace files on save are still
    /// observed.
    pub async fn track<P: AsRef<Path>>(&mut self, unit: &str, path: P) -> notify::Result<()> {
        let path = path.as_ref();
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        info!("Tracking source of unit {}: {:?}", unit, canonical);

        {
            let mut map = self.path_to_unit.write().await;
            map.insert(canonical.clone(), unit.to_string());
        }

        let dir = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(canonical);

        if !self.watched_dirs.contains(&dir) {
            if let Some(watcher) = self.watcher.as_mut() {
                watcher.watch(&dir, RecursiveMode::NonRecursive)?;
            }
            self.watched_dirs.push(dir);
        }

        Ok(())
    }

    /// Stop tracking a unit's source file.
    pub async fn untrack(&mut self, unit: &str) {
        let mut map = self.path_to_unit.write().await;
        map.retain(|_, tracked| tracked != unit);
    }

    /// Start observing. No-op under the manual strategy.
    pub fn start(&mut self) -> notify::Result<()> {
        if !self.config.enabled {
            info!("Source watcher disabled (manual reload strategy)");
            return Ok(());
        }

        info!("Starting source watcher");

        let (raw_tx, raw_rx) = mpsc::channel::<Event>(1024);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                if let Ok(event) = result {
                    let _ = raw_tx.blocking_send(event);
                }
            },
            Config::default().with_poll_interval(Duration::from_millis(100)),
        )?;

        for dir in &self.watched_dirs {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
        }
        self.watcher = Some(watcher);

        self.spawn_batcher(raw_rx, shutdown_rx);
        Ok(())
    }

    /// Stop observing.
    pub async fn stop(&mut self) {
        info!("Stopping source watcher");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        self.watcher = None;
    }

    fn spawn_batcher(
        &self,
        mut raw_rx: mpsc::Receiver<Event>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let path_to_unit = self.path_to_unit.clone();
        let batch_tx = self.batch_tx.clone();
        let event_tx = self.event_tx.clone();
        let debounce = self.config.debounce;

        tokio::spawn(async move {
            let mut pending: BTreeSet<String> = BTreeSet::new();
            let mut deadline: Option<tokio::time::Instant> = None;

            loop {
                tokio::select! {
                    Some(event) = raw_rx.recv() => {
                        if !matches!(
                            event.kind,
                            EventKind::Create(_) | EventKind::Modify(_)
                        ) {
                            continue;
                        }

                        let map = path_to_unit.read().await;
                        for path in &event.paths {
                            let canonical = path
                                .canonicalize()
                                .unwrap_or_else(|_| path.clone());
                            let Some(unit) = map.get(&canonical) else {
                                continue;
                            };

                            debug!("Source change for unit {}: {:?}", unit, canonical);
                            if let Some(tx) = &event_tx {
                                let _ = tx.send(ReloadEvent::UnitChanged {
                                    unit: unit.clone(),
                                    path: canonical.clone(),
                                });
                            }

                            pending.insert(unit.clone());
                            deadline = Some(tokio::time::Instant::now() + debounce);
                        }
                    }

                    // Armed only while a batch is pending; otherwise the
                    // task sleeps until the next raw event or shutdown.
                    _ = async move {
                        match deadline {
                            Some(d) => tokio::time::sleep_until(d).await,
                            None => std::future::pending().await,
                        }
                    } => {
                        deadline = None;
                        if !pending.is_empty() {
                            let batch: Vec<String> =
                                std::mem::take(&mut pending).into_iter().collect();

                            debug!("Dispatching change batch: {:?}", batch);
                            if batch_tx.send(batch).await.is_err() {
                                warn!("Batch receiver dropped; stopping watcher task");
                                return;
                            }
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        debug!("Source watcher task shutting down");
                        return;
                    }
                }
            }
        });
    }
}
