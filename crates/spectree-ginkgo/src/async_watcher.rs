//! Async Discovery Watcher
//!
//! Re-runs discovery when test files change. Filesystem events come from the
//! `notify` crate; hosts that watch files themselves can push changes through
//! [`WatcherHandle::notify_change`]. Changes are debounced, and passes are
//! single-flight with one trailing re-run.

use crate::config::RunnerConfig;
use crate::error::Result;
use crate::gate::DiscoveryGate;
use crate::workspace::{DiscoveryOutcome, Workspace};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;

/// Configuration for the async watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiet period after the last change before rediscovering
    pub debounce: Duration,
    /// Run one discovery pass as soon as the watcher starts
    pub discover_on_start: bool,
    /// Subscribe to filesystem events under the workspace root
    pub watch_filesystem: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            discover_on_start: true,
            watch_filesystem: true,
        }
    }
}

impl WatcherConfig {
    pub fn from_runner(config: &RunnerConfig) -> Self {
        Self {
            debounce: config.debounce(),
            ..Self::default()
        }
    }
}

/// Whether a filesystem event should trigger rediscovery.
pub fn is_relevant(event: &Event, config: &RunnerConfig) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event.paths.iter().any(|p| config.watches(p))
}

/// Watches a workspace and reports every completed discovery pass.
pub struct AsyncDiscoveryWatcher {
    workspace: Arc<Mutex<Workspace>>,
    gate: Arc<DiscoveryGate>,
    config: WatcherConfig,
}

impl AsyncDiscoveryWatcher {
    /// Create a watcher for a shared workspace. Uses the workspace's
    /// debounce setting unless `config` is given.
    pub async fn new(workspace: Arc<Mutex<Workspace>>, config: Option<WatcherConfig>) -> Self {
        let config = match config {
            Some(config) => config,
            None => WatcherConfig::from_runner(workspace.lock().await.config()),
        };
        Self {
            workspace,
            gate: Arc::new(DiscoveryGate::new()),
            config,
        }
    }

    /// Start watching. Each finished pass is sent to `tx`.
    ///
    /// Returns a handle that can push changes and stop the watcher.
    pub async fn start(self, tx: mpsc::Sender<DiscoveryOutcome>) -> Result<WatcherHandle> {
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let (change_tx, mut change_rx) = mpsc::channel::<()>(64);

        let (root, runner_config) = {
            let ws = self.workspace.lock().await;
            (ws.root().to_path_buf(), ws.config().clone())
        };

        let watcher = if self.config.watch_filesystem {
            let event_tx = change_tx.clone();
            let filter = runner_config.clone();
            let watcher_result: std::result::Result<RecommendedWatcher, notify::Error> =
                notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
                    if let Ok(event) = res
                        && is_relevant(&event, &filter)
                    {
                        // A full channel already holds a pending change.
                        let _ = event_tx.try_send(());
                    }
                });

            match watcher_result {
                Ok(mut w) => match w.watch(&root, RecursiveMode::Recursive) {
                    Ok(()) => Some(w),
                    Err(e) => {
                        tracing::warn!(
                            root = %root.display(),
                            error = %e,
                            "cannot watch workspace, changes must be pushed"
                        );
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "failed to create file watcher, changes must be pushed"
                    );
                    None
                }
            }
        } else {
            None
        };

        let workspace = self.workspace;
        let gate = self.gate;
        let debounce = self.config.debounce;
        let discover_on_start = self.config.discover_on_start;

        let handle = tokio::spawn(async move {
            if discover_on_start {
                request_pass(&workspace, &gate, &tx);
            }

            let mut deadline: Option<Instant> = None;
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        break;
                    }

                    Some(()) = change_rx.recv() => {
                        deadline = Some(Instant::now() + debounce);
                    }

                    _ = wait_until(deadline), if deadline.is_some() => {
                        deadline = None;
                        request_pass(&workspace, &gate, &tx);
                    }
                }
            }

            drop(watcher);
        });

        Ok(WatcherHandle {
            stop_tx,
            change_tx,
            _task: handle,
        })
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Start a discovery pass unless one is running, in which case it re-runs
/// once when done.
fn request_pass(
    workspace: &Arc<Mutex<Workspace>>,
    gate: &Arc<DiscoveryGate>,
    tx: &mpsc::Sender<DiscoveryOutcome>,
) {
    if !gate.request() {
        tracing::debug!("discovery already running, queued one re-run");
        return;
    }

    let workspace = workspace.clone();
    let gate = gate.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        loop {
            let outcome = workspace.lock().await.discover().await;
            let _ = tx.send(outcome).await;
            if !gate.complete() {
                break;
            }
        }
    });
}

/// Handle to control a running watcher
pub struct WatcherHandle {
    stop_tx: mpsc::Sender<()>,
    change_tx: mpsc::Sender<()>,
    _task: tokio::task::JoinHandle<()>,
}

impl WatcherHandle {
    /// Report a change the host observed itself; debounced like file events.
    pub async fn notify_change(&self) {
        let _ = self.change_tx.send(()).await;
    }

    /// Stop the watcher
    pub async fn stop(self) {
        let _ = self.stop_tx.send(()).await;
    }
}
