// src/watch/controller.rs

//! Per-binding rebuild state machine.
//!
//! Every [`WatchBinding`] gets its own tokio task that moves through
//! `Idle -> Debouncing -> Running -> Idle`:
//!
//! - **Idle**: waiting for the first changed path.
//! - **Debouncing**: collecting further paths; every new path restarts the
//!   window. When the window expires without new events, the collected set
//!   is handed to the binding's action.
//! - **Running**: the action is executing. Paths arriving now stay buffered
//!   and start exactly one more debounce cycle after the run.
//!
//! Because a binding only ever runs from its own task, the same binding can
//! never run twice concurrently; different bindings are independent.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dag::ActionFuture;
use crate::types::TaskName;
use crate::watch::hash::{compute_file_hash, ContentHashes};
use crate::watch::patterns::PathMatcher;

/// Incremental rebuild callback: receives the project-relative paths that
/// changed since the last run.
pub type BindingAction = Arc<dyn Fn(Vec<PathBuf>) -> ActionFuture + Send + Sync>;

/// Where a binding is in its rebuild cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Idle,
    Debouncing,
    Running,
}

/// A glob matcher bound to the action that rebuilds what it matches.
#[derive(Clone)]
pub struct WatchBinding {
    name: TaskName,
    matcher: PathMatcher,
    action: BindingAction,
}

impl fmt::Debug for WatchBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchBinding")
            .field("name", &self.name)
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

impl WatchBinding {
    pub fn new(name: impl Into<TaskName>, matcher: PathMatcher, action: BindingAction) -> Self {
        Self {
            name: name.into(),
            matcher,
            action,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }
}

struct BindingHandle {
    name: TaskName,
    matcher: PathMatcher,
    tx: mpsc::UnboundedSender<PathBuf>,
    state: watch::Receiver<BindingState>,
    runs: Arc<AtomicU64>,
    join: JoinHandle<()>,
}

/// Owns the binding tasks of one watch session.
pub struct WatchController {
    bindings: Vec<BindingHandle>,
    cancel: CancellationToken,
}

impl fmt::Debug for WatchController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.bindings.iter().map(|b| b.name.as_str()).collect();
        f.debug_struct("WatchController")
            .field("bindings", &names)
            .finish_non_exhaustive()
    }
}

impl WatchController {
    /// Spawn one task per binding. Must be called inside a tokio runtime.
    ///
    /// `root` is the project root used to read changed files for the
    /// content-hash check. After `cancel` fires no new run starts; a run in
    /// progress finishes first.
    pub fn start(
        root: impl Into<PathBuf>,
        bindings: Vec<WatchBinding>,
        debounce: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let root = Arc::new(root.into());
        let handles = bindings
            .into_iter()
            .map(|binding| {
                let (tx, rx) = mpsc::unbounded_channel();
                let (state_tx, state_rx) = watch::channel(BindingState::Idle);
                let runs = Arc::new(AtomicU64::new(0));
                let name = binding.name.clone();
                let matcher = binding.matcher.clone();
                let worker = BindingWorker {
                    binding,
                    root: Arc::clone(&root),
                    rx,
                    state: state_tx,
                    runs: Arc::clone(&runs),
                    debounce,
                    cancel: cancel.clone(),
                    hashes: ContentHashes::new(),
                };
                let join = tokio::spawn(worker.run());
                BindingHandle {
                    name,
                    matcher,
                    tx,
                    state: state_rx,
                    runs,
                    join,
                }
            })
            .collect();

        info!(debounce_ms = debounce.as_millis() as u64, "watch controller started");
        Self {
            bindings: handles,
            cancel,
        }
    }

    /// Route a changed project-relative path to every binding whose pattern
    /// matches it. Returns the number of bindings notified.
    pub fn dispatch(&self, rel_path: &str) -> usize {
        if self.cancel.is_cancelled() {
            return 0;
        }
        let mut notified = 0;
        for handle in self.bindings.iter().filter(|h| h.matcher.matches(rel_path)) {
            debug!(binding = %handle.name, path = %rel_path, "change routed to binding");
            if handle.tx.send(PathBuf::from(rel_path)).is_ok() {
                notified += 1;
            }
        }
        notified
    }

    pub fn binding_names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|b| b.name.as_str())
    }

    pub fn state_of(&self, binding: &str) -> Option<BindingState> {
        self.handle(binding).map(|h| *h.state.borrow())
    }

    /// How many times the binding's action has been invoked.
    pub fn run_count(&self, binding: &str) -> Option<u64> {
        self.handle(binding).map(|h| h.runs.load(Ordering::SeqCst))
    }

    /// Stop the session and wait for every binding task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.join().await;
    }

    /// Wait for every binding task to finish (after the token was
    /// cancelled elsewhere).
    pub async fn join(self) {
        for handle in self.bindings {
            let name = handle.name;
            if let Err(err) = handle.join.await {
                error!(binding = %name, error = %err, "watch binding task failed");
            }
        }
        debug!("watch controller stopped");
    }

    fn handle(&self, binding: &str) -> Option<&BindingHandle> {
        self.bindings.iter().find(|h| h.name == binding)
    }
}

struct BindingWorker {
    binding: WatchBinding,
    root: Arc<PathBuf>,
    rx: mpsc::UnboundedReceiver<PathBuf>,
    state: watch::Sender<BindingState>,
    runs: Arc<AtomicU64>,
    debounce: Duration,
    cancel: CancellationToken,
    hashes: ContentHashes,
}

impl BindingWorker {
    async fn run(mut self) {
        let mut pending: BTreeSet<PathBuf> = BTreeSet::new();
        let mut closed = false;

        while !closed {
            if pending.is_empty() {
                self.set_state(BindingState::Idle);
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    received = self.rx.recv() => match received {
                        Some(path) => {
                            pending.insert(path);
                        }
                        None => break,
                    },
                }
            }

            self.set_state(BindingState::Debouncing);
            let mut deadline = Instant::now() + self.debounce;
            loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        debug!(binding = %self.binding.name, dropped = pending.len(), "stopped while debouncing");
                        self.set_state(BindingState::Idle);
                        return;
                    }
                    received = self.rx.recv() => match received {
                        Some(path) => {
                            pending.insert(path);
                            deadline = Instant::now() + self.debounce;
                        }
                        None => {
                            closed = true;
                            break;
                        }
                    },
                    _ = tokio::time::sleep_until(deadline) => break,
                }
            }

            let batch: Vec<PathBuf> = std::mem::take(&mut pending).into_iter().collect();
            let changed = self.filter_unchanged(batch).await;
            if changed.is_empty() {
                debug!(binding = %self.binding.name, "content unchanged; skipping rebuild");
                continue;
            }

            self.set_state(BindingState::Running);
            self.run_action(changed).await;

            // Anything that arrived while running starts the next cycle.
            while let Ok(path) = self.rx.try_recv() {
                pending.insert(path);
            }
        }

        self.set_state(BindingState::Idle);
    }

    fn set_state(&self, state: BindingState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(binding = %self.binding.name, ?previous, ?state, "binding state changed");
        }
    }

    /// Drop paths whose content hash equals the last successfully processed
    /// one. Deleted files are always kept.
    async fn filter_unchanged(&mut self, batch: Vec<PathBuf>) -> Vec<(PathBuf, Option<String>)> {
        let root = Arc::clone(&self.root);
        let hashed = tokio::task::spawn_blocking(move || {
            batch
                .into_iter()
                .map(|path| {
                    let hash = hash_or_none(&root.join(&path));
                    (path, hash)
                })
                .collect::<Vec<_>>()
        })
        .await;

        let hashed = match hashed {
            Ok(h) => h,
            Err(err) => {
                warn!(binding = %self.binding.name, error = %err, "hashing task failed");
                return Vec::new();
            }
        };

        hashed
            .into_iter()
            .filter(|(path, hash)| match hash {
                Some(h) if self.hashes.is_unchanged(path, h) => {
                    debug!(binding = %self.binding.name, path = ?path, "content hash unchanged");
                    false
                }
                _ => true,
            })
            .collect()
    }

    async fn run_action(&mut self, changed: Vec<(PathBuf, Option<String>)>) {
        let paths: Vec<PathBuf> = changed.iter().map(|(p, _)| p.clone()).collect();
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        info!(binding = %self.binding.name, run, changed = paths.len(), "rebuilding");

        let result = tokio::spawn((self.binding.action)(paths)).await;
        let ok = match result {
            Ok(Ok(report)) if report.is_success() => {
                info!(binding = %self.binding.name, run, artifacts = report.artifacts.len(), "rebuild finished");
                true
            }
            Ok(Ok(report)) => {
                for failure in &report.input_failures {
                    error!(binding = %self.binding.name, stage = %failure.stage, path = ?failure.path, error = %failure.message, "rebuild input failed");
                }
                false
            }
            Ok(Err(err)) => {
                error!(binding = %self.binding.name, error = %format!("{err:#}"), "rebuild failed");
                false
            }
            Err(err) => {
                error!(binding = %self.binding.name, error = %err, "rebuild panicked");
                false
            }
        };

        // Only a successful run makes its content the new baseline; after a
        // failure the same content must be allowed to retry.
        for (path, hash) in changed {
            match hash {
                Some(h) if ok => self.hashes.record(path, h),
                _ => self.hashes.forget(&path),
            }
        }
    }
}

fn hash_or_none(path: &Path) -> Option<String> {
    match compute_file_hash(path) {
        Ok(hash) => hash,
        Err(err) => {
            debug!(path = ?path, error = %err, "could not hash changed file");
            None
        }
    }
}
