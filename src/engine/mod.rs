// src/engine/mod.rs

//! Execution engine for a single task-graph run.
//!
//! This module ties together:
//! - the DAG scheduler
//! - the runtime event loop that reacts to:
//!   - task completion events from the executor
//!   - cancellation of the run by the caller
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. Results are collected as [`BuildResult`]s.

use std::time::Duration;

use crate::dag::ActionReport;

pub use crate::types::TaskName;

/// Outcome of a task action for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    /// The action failed; the string is a one-line reason for the summary.
    Failed(String),
    /// The action failed to update the output tree. Reported like `Failed`,
    /// and no further task of the run starts.
    Aborted(String),
}

/// Everything the executor reports about one finished task action.
#[derive(Debug, Clone)]
pub struct TaskCompletion {
    pub task: TaskName,
    pub outcome: TaskOutcome,
    pub duration: Duration,
    pub report: ActionReport,
}

impl TaskCompletion {
    /// Convenience for executors that have nothing to report beyond the outcome.
    pub fn bare(task: impl Into<TaskName>, outcome: TaskOutcome) -> Self {
        Self {
            task: task.into(),
            outcome,
            duration: Duration::ZERO,
            report: ActionReport::default(),
        }
    }
}

/// Events flowing into the runtime from the executor and the caller.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A task action finished.
    TaskCompleted(TaskCompletion),
    /// The caller asked for the run to stop starting new tasks.
    CancelRequested,
}

pub mod core;
pub mod event_handlers;
pub mod result;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use result::{BuildResult, BuildSummary, TaskStatus};
pub use runtime::Runtime;
