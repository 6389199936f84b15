// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::ScheduledTask;
use crate::types::TaskName;

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step the DAG and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that became ready to run as a result of this step.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks that were newly skipped in this step, paired with the failed
    /// task that caused it.
    pub newly_skipped: Vec<(TaskName, TaskName)>,
    /// Tasks that were newly cancelled in this step.
    pub newly_cancelled: Vec<TaskName>,
    /// Whether this step caused the current run to finish (i.e. the scheduler
    /// is now idle).
    pub run_just_finished: bool,
}
