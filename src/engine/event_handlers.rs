// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::collections::HashSet;

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep};
use crate::engine::{BuildResult, TaskCompletion, TaskName, TaskOutcome, TaskStatus};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running (false once every
    /// task of the run reached a terminal state).
    pub keep_running: bool,
}

/// Seed a new run with every task of `run_set`.
pub fn start_run(
    scheduler: &mut Scheduler,
    results: &mut Vec<BuildResult>,
    run_set: &HashSet<TaskName>,
) -> CoreStep {
    let step = scheduler.start_run(run_set);
    into_core_step(scheduler, results, step)
}

/// Handle a task completion event: record its result and schedule whatever
/// became ready (or skip whatever can no longer run).
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    results: &mut Vec<BuildResult>,
    completion: TaskCompletion,
) -> CoreStep {
    let mut step = scheduler.step_completion(&completion.task, &completion.outcome);

    let status = match &completion.outcome {
        TaskOutcome::Success => TaskStatus::Succeeded,
        TaskOutcome::Failed(reason) => TaskStatus::Failed {
            reason: reason.clone(),
        },
        TaskOutcome::Aborted(reason) => {
            // Dependents are already skipped; everything else still pending
            // is cancelled. Running tasks finish.
            let aborted = scheduler.cancel_pending();
            step.newly_cancelled.extend(aborted.newly_cancelled);
            step.run_just_finished |= aborted.run_just_finished;
            TaskStatus::Failed {
                reason: reason.clone(),
            }
        }
    };
    results.push(BuildResult {
        task: completion.task,
        status,
        duration: completion.duration,
        artifacts: completion.report.artifacts,
        input_failures: completion.report.input_failures,
    });

    into_core_step(scheduler, results, step)
}

/// Handle a cancellation request: nothing new starts, running tasks finish.
pub fn handle_cancel(scheduler: &mut Scheduler, results: &mut Vec<BuildResult>) -> CoreStep {
    let step = scheduler.cancel_pending();
    into_core_step(scheduler, results, step)
}

fn into_core_step(
    scheduler: &Scheduler,
    results: &mut Vec<BuildResult>,
    step: SchedulerStep,
) -> CoreStep {
    for (task, failed_dependency) in step.newly_skipped {
        results.push(BuildResult::not_run(
            task,
            TaskStatus::SkippedDueToDependencyFailure { failed_dependency },
        ));
    }
    for task in step.newly_cancelled {
        results.push(BuildResult::not_run(task, TaskStatus::Cancelled));
    }

    let mut commands = Vec::new();
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }

    CoreStep {
        commands,
        keep_running: !scheduler.is_idle(),
    }
}
