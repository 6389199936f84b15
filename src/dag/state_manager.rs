// src/dag/state_manager.rs

//! Per-run state management for tasks in the scheduler.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo};
use crate::dag::TaskGraph;
use crate::types::TaskName;

/// Manages per-run state transitions for tasks.
pub struct StateManager<'a> {
    graph: &'a TaskGraph,
    tasks: &'a mut HashMap<TaskName, TaskInfo>,
    current_run_id: Option<u64>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a TaskGraph,
        tasks: &'a mut HashMap<TaskName, TaskInfo>,
        current_run_id: Option<u64>,
    ) -> Self {
        Self {
            graph,
            tasks,
            current_run_id,
        }
    }

    /// Put every task of `run_set` into `Pending`.
    pub fn mark_run_set_pending(&mut self, run_set: &HashSet<TaskName>) {
        for name in run_set {
            match self.tasks.get_mut(name) {
                Some(info) => {
                    info.run_state = Some(RunState::Pending);
                    debug!(task = %info.name, "marked Pending for this run");
                }
                None => warn!(task = %name, "run set names a task missing from tasks map"),
            }
        }
    }

    /// Determine whether all dependencies of the given task have succeeded in
    /// the *current run*.
    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        let ro = ReadOnlyStateManager::new(self.tasks);
        ro.deps_satisfied_for_info(info)
    }

    /// Mark every pending transitive dependent of `failed_task` as skipped.
    ///
    /// Returns the newly skipped task names (excluding the failed task).
    pub fn mark_dependents_skipped(&mut self, failed_task: &str) -> Vec<TaskName> {
        let mut stack: Vec<TaskName> = self.graph.dependents_of(failed_task).to_vec();
        let mut newly_skipped = Vec::new();

        while let Some(name) = stack.pop() {
            if let Some(info) = self.tasks.get_mut(&name) {
                match info.run_state {
                    Some(RunState::Pending) => {
                        info.run_state = Some(RunState::Skipped(failed_task.to_string()));
                        debug!(
                            task = %info.name,
                            failed_dependency = %failed_task,
                            "skipping dependent due to upstream failure"
                        );
                        newly_skipped.push(info.name.clone());
                        stack.extend(self.graph.dependents_of(&name).iter().cloned());
                    }
                    Some(RunState::Running) => {
                        // Cannot happen: a dependent only starts after this
                        // task succeeded.
                        warn!(task = %info.name, "dependent of failed task is already running");
                    }
                    _ => {
                        // Either already terminal or not participating in this run.
                    }
                }
            }
        }

        newly_skipped
    }

    /// Mark every pending task as cancelled.
    pub fn cancel_pending(&mut self) -> Vec<TaskName> {
        let mut cancelled = Vec::new();
        for info in self.tasks.values_mut() {
            if matches!(info.run_state, Some(RunState::Pending)) {
                info.run_state = Some(RunState::Cancelled);
                cancelled.push(info.name.clone());
            }
        }
        cancelled.sort();
        cancelled
    }

    /// Collect tasks that are `Pending` and whose dependencies are satisfied,
    /// mark them as `Running`, and return them as `ScheduledTask`s.
    pub fn collect_new_ready_tasks(&mut self) -> Vec<ScheduledTask> {
        let mut ready = Vec::new();

        // Decide first, then mutate to avoid borrowing issues.
        let mut candidates: Vec<TaskName> = self
            .tasks
            .values()
            .filter_map(|info| {
                if matches!(info.run_state, Some(RunState::Pending))
                    && self.deps_satisfied_for_info(info)
                {
                    Some(info.name.clone())
                } else {
                    None
                }
            })
            .collect();
        candidates.sort();

        for name in candidates {
            if let Some(info) = self.tasks.get_mut(&name) {
                info!(
                    task = %info.name,
                    run_id = self.current_run_id,
                    "dependencies satisfied; scheduling task"
                );

                info.run_state = Some(RunState::Running);
                info.dispatched += 1;
                ready.push(ScheduledTask::from_task_info(
                    info,
                    self.current_run_id.unwrap_or(0),
                ));
            }
        }

        ready
    }

    /// Check if all tasks are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        !self.tasks.values().any(|info| {
            matches!(
                info.run_state,
                Some(RunState::Pending) | Some(RunState::Running)
            )
        })
    }
}

/// A read-only view of the state manager for checking dependency satisfaction.
///
/// This is used when we only have shared access to the tasks map (e.g. in `Scheduler::deps_satisfied`).
pub struct ReadOnlyStateManager<'a> {
    tasks: &'a HashMap<TaskName, TaskInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(tasks: &'a HashMap<TaskName, TaskInfo>) -> Self {
        Self { tasks }
    }

    /// A dependency is satisfied only once it has succeeded in this run.
    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        info.deps.iter().all(|dep_name| match self.tasks.get(dep_name) {
            Some(dep) => matches!(dep.run_state, Some(RunState::Succeeded)),
            None => {
                warn!(
                    task = %info.name,
                    dep = %dep_name,
                    "dependency missing from tasks map"
                );
                false
            }
        })
    }
}
