use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::dag::graph::TaskGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo, TaskRunState};
use crate::engine::TaskOutcome;
use crate::types::TaskName;

/// Scheduler holds the immutable DAG plus mutable per-run state.
///
/// It is responsible for:
/// - remembering which tasks are part of the current run
/// - deciding when a task is "ready" to run (all deps succeeded)
/// - marking tasks as succeeded/failed
/// - skipping dependents when a task fails
/// - cancelling tasks that have not started yet
#[derive(Debug)]
pub struct Scheduler {
    graph: TaskGraph,
    tasks: HashMap<TaskName, TaskInfo>,
    /// Monotonically increasing run ID.
    run_counter: u64,
    /// Currently active run ID, or `None` if there is no active run.
    current_run_id: Option<u64>,
}

impl Scheduler {
    /// Construct a scheduler for the given graph.
    pub fn from_graph(graph: &TaskGraph) -> Self {
        let mut tasks = HashMap::new();

        for name in graph.tasks() {
            let deps = graph.dependencies_of(name).to_vec();
            let Some(action) = graph.action_of(name) else {
                continue;
            };
            tasks.insert(name.to_string(), TaskInfo::new(name.to_string(), deps, action));
        }

        Self {
            graph: graph.clone(),
            tasks,
            run_counter: 0,
            current_run_id: None,
        }
    }

    /// Returns `true` if there is currently no active run.
    pub fn is_idle(&self) -> bool {
        self.current_run_id.is_none()
    }

    /// Current run ID, if any.
    pub fn current_run_id(&self) -> Option<u64> {
        self.current_run_id
    }

    /// Read-only view of the given task's run state.
    pub fn run_state_of(&self, task: &str) -> Option<TaskRunState> {
        let info = self.tasks.get(task)?;
        Some(TaskRunState::from(&info.run_state))
    }

    /// How often the task's action was dispatched in the current (or last) run.
    pub fn dispatch_count(&self, task: &str) -> Option<u32> {
        self.tasks.get(task).map(|info| info.dispatched)
    }

    /// Names of tasks participating in the *active* run.
    pub fn tasks_in_current_run(&self) -> Vec<TaskName> {
        if self.current_run_id.is_none() {
            return Vec::new();
        }

        self.tasks
            .values()
            .filter(|info| info.run_state.is_some())
            .map(|info| info.name.clone())
            .collect()
    }

    /// Whether the dependencies of `task` are satisfied for the *current run*.
    ///
    /// Returns `None` if the task is unknown.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        let info = self.tasks.get(task)?;
        let mgr = ReadOnlyStateManager::new(&self.tasks);
        Some(mgr.deps_satisfied_for_info(info))
    }

    /// All task names, in registration order.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.graph.tasks()
    }

    /// Start a new run over `run_set`, resetting all per-run state, and
    /// return the tasks that can start immediately.
    ///
    /// Unknown names in `run_set` are ignored with a warning.
    pub fn start_run(&mut self, run_set: &HashSet<TaskName>) -> SchedulerStep {
        if let Some(active) = self.current_run_id {
            warn!(run_id = active, "start_run called while a run is active; restarting");
        }

        self.run_counter += 1;
        self.current_run_id = Some(self.run_counter);

        for info in self.tasks.values_mut() {
            info.run_state = None;
            info.dispatched = 0;
        }

        debug!(
            run_id = self.run_counter,
            tasks = run_set.len(),
            "scheduler: starting new DAG run"
        );

        let mut manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
        manager.mark_run_set_pending(run_set);
        let newly_scheduled = manager.collect_new_ready_tasks();
        let run_just_finished = self.maybe_finish_run();

        SchedulerStep {
            newly_scheduled,
            run_just_finished,
            ..SchedulerStep::default()
        }
    }

    /// Handle completion of a task with a concrete outcome (production API).
    pub fn handle_completion(&mut self, task: &str, outcome: &TaskOutcome) -> Vec<ScheduledTask> {
        self.completion_step_internal(task, outcome).newly_scheduled
    }

    /// Manual-step variant of `handle_completion` that returns a rich [`SchedulerStep`].
    pub fn step_completion(&mut self, task: &str, outcome: &TaskOutcome) -> SchedulerStep {
        self.completion_step_internal(task, outcome)
    }

    /// Cancel every task of the active run that has not started yet.
    ///
    /// Running tasks are left alone; the run finishes once they complete.
    pub fn cancel_pending(&mut self) -> SchedulerStep {
        if self.current_run_id.is_none() {
            return SchedulerStep::default();
        }

        let mut manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
        let newly_cancelled = manager.cancel_pending();
        if !newly_cancelled.is_empty() {
            info!(
                run_id = self.current_run_id,
                cancelled = ?newly_cancelled,
                "run cancelled; pending tasks will not start"
            );
        }
        let run_just_finished = self.maybe_finish_run();

        SchedulerStep {
            newly_cancelled,
            run_just_finished,
            ..SchedulerStep::default()
        }
    }

    /// Determine whether all tasks are in a terminal state and clear
    /// `current_run_id` if so.
    ///
    /// Returns `true` if this call transitioned the scheduler from running
    /// to idle.
    fn maybe_finish_run(&mut self) -> bool {
        if self.current_run_id.is_none() {
            return false;
        }

        let manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);

        if manager.all_tasks_terminal() {
            info!(
                run_id = self.current_run_id,
                "scheduler: all tasks terminal; marking run as finished"
            );
            self.current_run_id = None;
            true
        } else {
            false
        }
    }

    /// Internal implementation of `handle_completion` / `step_completion`.
    fn completion_step_internal(&mut self, task: &str, outcome: &TaskOutcome) -> SchedulerStep {
        let run_id = match self.current_run_id {
            Some(id) => id,
            None => {
                warn!(
                    task = %task,
                    "handle_completion called with no active run; ignoring"
                );
                return SchedulerStep::default();
            }
        };

        let mut step = SchedulerStep::default();

        match self.tasks.get_mut(task) {
            Some(info) if matches!(info.run_state, Some(RunState::Running)) => match outcome {
                TaskOutcome::Success => {
                    info.run_state = Some(RunState::Succeeded);
                    debug!(task = %info.name, run_id, "task completed successfully");
                    let mut manager =
                        StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
                    step.newly_scheduled = manager.collect_new_ready_tasks();
                }
                TaskOutcome::Failed(reason) | TaskOutcome::Aborted(reason) => {
                    info.run_state = Some(RunState::Failed);
                    warn!(
                        task = %info.name,
                        run_id,
                        reason = %reason,
                        "task failed; skipping dependents in this run"
                    );
                    let mut manager =
                        StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
                    step.newly_skipped = manager
                        .mark_dependents_skipped(task)
                        .into_iter()
                        .map(|skipped| (skipped, task.to_string()))
                        .collect();
                }
            },
            Some(info) => {
                warn!(
                    task = %task,
                    state = ?info.run_state,
                    "completion for task that is not running; ignoring"
                );
            }
            None => {
                warn!(task = %task, "completion for unknown task; ignoring");
            }
        }

        step.run_just_finished = self.maybe_finish_run();
        step
    }
}
