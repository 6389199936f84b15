// src/reload.rs

//! Reload notification after artifacts were written.
//!
//! Notifiers are best-effort: a failing notifier is logged and never fails
//! the build that produced the artifacts.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Informed after every pipeline invocation that wrote artifacts.
pub trait ReloadNotifier: Send + Sync + Debug {
    fn notify(&self, artifacts: &[PathBuf]) -> Result<()>;
}

/// Call `notifier` and swallow (but log) its failure.
pub fn notify_best_effort(notifier: &dyn ReloadNotifier, artifacts: &[PathBuf]) {
    if artifacts.is_empty() {
        return;
    }
    if let Err(err) = notifier.notify(artifacts) {
        warn!(error = %format!("{err:#}"), artifacts = artifacts.len(), "reload notification failed");
    }
}

/// Logs the written artifacts.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl ReloadNotifier for LogNotifier {
    fn notify(&self, artifacts: &[PathBuf]) -> Result<()> {
        info!(artifacts = ?artifacts, "artifacts updated; clients should reload");
        Ok(())
    }
}

/// Publishes every batch of written artifacts on a broadcast channel, for
/// embedders that push reloads to connected clients.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Arc<Vec<PathBuf>>>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Vec<PathBuf>>> {
        self.tx.subscribe()
    }
}

impl ReloadNotifier for BroadcastNotifier {
    fn notify(&self, artifacts: &[PathBuf]) -> Result<()> {
        self.tx
            .send(Arc::new(artifacts.to_vec()))
            .map(|_| ())
            .map_err(|_| anyhow!("no reload subscribers"))
    }
}
