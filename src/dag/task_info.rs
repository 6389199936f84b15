// src/dag/task_info.rs

//! Task metadata and per-run state management.

use std::fmt;

use crate::dag::graph::TaskAction;
use crate::types::TaskName;

/// Per-run state of a task (internal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// Task is part of this run but is waiting on dependencies.
    Pending,
    /// Task has been dispatched to the executor and is currently running.
    Running,
    Succeeded,
    Failed,
    /// Never started because `.0` (a transitive dependency) failed.
    Skipped(TaskName),
    /// Never started because the run was cancelled.
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Pending | RunState::Running)
    }
}

/// Public, read-only view of a task's per-run state.
///
/// This is exposed for tests and diagnostics without leaking the internal
/// `RunState` type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRunState {
    /// The task is not participating in the current run.
    NotInRun,
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped { failed_dependency: TaskName },
    Cancelled,
}

impl From<&Option<RunState>> for TaskRunState {
    fn from(state: &Option<RunState>) -> Self {
        match state {
            None => TaskRunState::NotInRun,
            Some(RunState::Pending) => TaskRunState::Pending,
            Some(RunState::Running) => TaskRunState::Running,
            Some(RunState::Succeeded) => TaskRunState::Succeeded,
            Some(RunState::Failed) => TaskRunState::Failed,
            Some(RunState::Skipped(dep)) => TaskRunState::Skipped {
                failed_dependency: dep.clone(),
            },
            Some(RunState::Cancelled) => TaskRunState::Cancelled,
        }
    }
}

/// Static task information taken from the graph, plus per-run state.
#[derive(Clone)]
pub struct TaskInfo {
    pub name: TaskName,
    /// Direct dependencies for this task.
    pub deps: Vec<TaskName>,
    pub action: TaskAction,

    /// Per-run state (None if not participating in the current run).
    pub run_state: Option<RunState>,

    /// How many times the action was dispatched in the current run. The
    /// scheduler guarantees this never exceeds 1.
    pub dispatched: u32,
}

impl fmt::Debug for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskInfo")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .field("run_state", &self.run_state)
            .field("dispatched", &self.dispatched)
            .finish_non_exhaustive()
    }
}

impl TaskInfo {
    pub fn new(name: TaskName, deps: Vec<TaskName>, action: TaskAction) -> Self {
        Self {
            name,
            deps,
            action,
            run_state: None,
            dispatched: 0,
        }
    }
}

/// Description of a task that the scheduler wants the executor to run now.
#[derive(Clone)]
pub struct ScheduledTask {
    pub name: TaskName,
    pub action: TaskAction,
    /// Monotonically increasing run identifier.
    pub run_id: u64,
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl ScheduledTask {
    pub fn from_task_info(info: &TaskInfo, run_id: u64) -> Self {
        Self {
            name: info.name.clone(),
            action: info.action.clone(),
            run_id,
        }
    }
}
