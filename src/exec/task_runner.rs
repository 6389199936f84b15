// src/exec/task_runner.rs

//! Individual task action runner.

use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::dag::{ActionReport, ScheduledTask};
use crate::engine::{RuntimeEvent, TaskCompletion, TaskOutcome};
use crate::errors::AssetdagError;

/// Run a single task action and emit exactly one `TaskCompleted` event.
///
/// The action runs on its own Tokio task so that a panic inside it is
/// reported as a failure instead of leaving the run waiting forever.
pub async fn run_task(task: ScheduledTask, runtime_tx: mpsc::Sender<RuntimeEvent>) {
    info!(task = %task.name, run_id = task.run_id, "starting task");

    let started = Instant::now();
    let action = (task.action)();
    let joined = tokio::spawn(action).await;
    let duration = started.elapsed();

    let (outcome, report) = match joined {
        Ok(Ok(report)) if report.is_success() => (TaskOutcome::Success, report),
        Ok(Ok(report)) => {
            let reason = format!("{} input(s) failed", report.input_failures.len());
            (TaskOutcome::Failed(reason), report)
        }
        Ok(Err(err)) if is_output_failure(&err) => {
            error!(task = %task.name, run_id = task.run_id, error = %format!("{err:#}"), "output write failed; aborting run");
            (TaskOutcome::Aborted(format!("{err:#}")), ActionReport::default())
        }
        Ok(Err(err)) => {
            error!(task = %task.name, run_id = task.run_id, error = %format!("{err:#}"), "task action error");
            (TaskOutcome::Failed(format!("{err:#}")), ActionReport::default())
        }
        Err(join_err) => {
            error!(task = %task.name, run_id = task.run_id, error = %join_err, "task action panicked");
            (
                TaskOutcome::Failed(format!("task panicked: {join_err}")),
                ActionReport::default(),
            )
        }
    };

    info!(
        task = %task.name,
        run_id = task.run_id,
        success = matches!(outcome, TaskOutcome::Success),
        artifacts = report.artifacts.len(),
        elapsed_ms = duration.as_millis() as u64,
        "task finished"
    );

    let completion = TaskCompletion {
        task: task.name.clone(),
        outcome,
        duration,
        report,
    };

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted(completion))
        .await
        .is_err()
    {
        warn!(task = %task.name, "runtime gone; dropping completion event");
    }
}

fn is_output_failure(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<AssetdagError>()
            .is_some_and(AssetdagError::is_output_error)
    })
}
