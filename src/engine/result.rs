// src/engine/result.rs

//! Per-task results of a run and the aggregate summary printed by the CLI.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::TransformError;
use crate::types::TaskName;

/// Final status of one task in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Succeeded,
    Failed { reason: String },
    /// Informational: the action was never invoked because a dependency failed.
    SkippedDueToDependencyFailure { failed_dependency: TaskName },
    /// The run was cancelled before this task could start.
    Cancelled,
}

/// Result of one task execution (or non-execution) within a run.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub task: TaskName,
    pub status: TaskStatus,
    pub duration: Duration,
    pub artifacts: Vec<PathBuf>,
    /// Inputs that failed a transform stage (only for pipeline tasks).
    pub input_failures: Vec<TransformError>,
}

impl BuildResult {
    pub fn not_run(task: TaskName, status: TaskStatus) -> Self {
        Self {
            task,
            status,
            duration: Duration::ZERO,
            artifacts: Vec::new(),
            input_failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, TaskStatus::Succeeded)
    }
}

/// Aggregate view over all results of a run.
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub results: Vec<BuildResult>,
}

impl BuildSummary {
    pub fn new(results: Vec<BuildResult>) -> Self {
        Self { results }
    }

    /// True when every task in the run succeeded.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(BuildResult::is_success)
    }

    pub fn result_for(&self, task: &str) -> Option<&BuildResult> {
        self.results.iter().find(|r| r.task == task)
    }

    /// Every artifact written during the run.
    pub fn artifacts(&self) -> impl Iterator<Item = &PathBuf> {
        self.results.iter().flat_map(|r| r.artifacts.iter())
    }

    /// One line per failed input and per unsuccessful task.
    pub fn failure_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for result in &self.results {
            for failure in &result.input_failures {
                lines.push(format!("error {failure}"));
            }
            match &result.status {
                TaskStatus::Succeeded => {}
                TaskStatus::Failed { reason } => {
                    lines.push(format!("FAILED {}: {}", result.task, reason));
                }
                TaskStatus::SkippedDueToDependencyFailure { failed_dependency } => {
                    lines.push(format!(
                        "SKIPPED {} (dependency {} failed)",
                        result.task, failed_dependency
                    ));
                }
                TaskStatus::Cancelled => {
                    lines.push(format!("CANCELLED {}", result.task));
                }
            }
        }
        lines
    }
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ok = self.results.iter().filter(|r| r.is_success()).count();
        write!(
            f,
            "{ok}/{} tasks succeeded, {} artifacts written",
            self.results.len(),
            self.artifacts().count()
        )
    }
}
