use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use assetdag::dag::ScheduledTask;
use assetdag::engine::{RuntimeEvent, TaskCompletion, TaskOutcome};
use assetdag::errors::Result;
use assetdag::exec::ExecutorBackend;
use tokio::sync::mpsc;

/// A fake executor that:
/// - records which tasks were "run", in dispatch order
/// - never calls the task actions
/// - immediately reports a completion for each scheduled task, failing the
///   ones registered with [`FakeExecutor::failing`].
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    failing: HashSet<String>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            runtime_tx,
            executed,
            failing: HashSet::new(),
        }
    }

    /// Report `task` as failed instead of succeeded.
    pub fn failing(mut self, task: &str) -> Self {
        self.failing.insert(task.to_string());
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let failing = self.failing.clone();

        Box::pin(async move {
            for t in tasks {
                executed.lock().unwrap().push(t.name.clone());

                let outcome = if failing.contains(&t.name) {
                    TaskOutcome::Failed("fake failure".to_string())
                } else {
                    TaskOutcome::Success
                };
                tx.send(RuntimeEvent::TaskCompleted(TaskCompletion::bare(t.name, outcome)))
                    .await
                    .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}
