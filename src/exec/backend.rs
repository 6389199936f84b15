// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning actions
//! itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production executor in [`super::task_runner`].
//!
//! - `RealExecutorBackend` is the default implementation. It runs each
//!   scheduled action on its own Tokio task so independent tasks overlap.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were scheduled and directly emits `TaskCompleted` events.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::errors::Result;

use super::task_runner::run_task;

/// Trait abstracting how scheduled tasks are executed.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    ///
    /// Implementations must eventually send exactly one
    /// `RuntimeEvent::TaskCompleted` per dispatched task.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor backend used in production.
pub struct RealExecutorBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl RealExecutorBackend {
    /// Create a new real executor backend, wiring it to the given runtime
    /// event sender.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { runtime_tx }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.runtime_tx.clone();

        Box::pin(async move {
            for task in tasks {
                let tx = tx.clone();
                tokio::spawn(run_task(task, tx));
            }
            Ok(())
        })
    }
}
