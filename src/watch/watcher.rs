// src/watch/watcher.rs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::watch::controller::WatchController;
use crate::watch::path_utils::{is_within, relative_str};

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive; dropping the handle
/// stops file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
    forwarder: JoinHandle<()>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish_non_exhaustive()
    }
}

impl WatcherHandle {
    /// Stop watching and wait for the forwarding task to drain.
    pub async fn stop(self) {
        drop(self._inner);
        if let Err(err) = self.forwarder.await {
            warn!(error = %err, "watch event forwarder failed");
        }
    }
}

/// Watch `root` recursively and route every changed path to `controller`.
///
/// - `root` is the project root; patterns are evaluated against paths
///   relative to it.
/// - Paths under `output_root` (project-relative) are ignored so that
///   writing artifacts never triggers a rebuild.
/// - Forwarding stops once `cancel` fires.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    output_root: impl Into<PathBuf>,
    controller: Arc<WatchController>,
    cancel: CancellationToken,
) -> Result<WatcherHandle> {
    let root = root.into();
    // Canonicalize once so we have a stable base path.
    let root = root.canonicalize().unwrap_or(root);
    let output_root = output_root.into();

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                // The receiver is gone once the session is stopping.
                let _ = event_tx.send(event);
            }
            Err(err) => warn!(error = %err, "file watch error"),
        },
        Config::default(),
    )
    .context("creating file watcher")?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("watching {:?}", root))?;

    info!(root = ?root, "file watcher started");

    let forwarder = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = event_rx.recv() => match received {
                    Some(event) => event,
                    None => break,
                },
            };

            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                continue;
            }

            for path in &event.paths {
                let Some(rel) = relative_str(&root, path) else {
                    debug!(path = ?path, root = ?root, "event outside project root; ignoring");
                    continue;
                };
                if is_within(&rel, &output_root) {
                    continue;
                }
                let notified = controller.dispatch(&rel);
                debug!(path = %rel, bindings = notified, "file change");
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle {
        _inner: watcher,
        forwarder,
    })
}
