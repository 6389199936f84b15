// src/dag/graph.rs

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dag::Scheduler;
use crate::engine::{BuildResult, CoreRuntime, Runtime, RuntimeEvent};
use crate::errors::{AssetdagError, Result};
use crate::exec::{ExecutorBackend, RealExecutorBackend};
use crate::pipeline::TransformError;
use crate::types::TaskName;

/// What a task action produced.
///
/// An action that returns `Ok` with non-empty `input_failures` still counts
/// as a failed task: some inputs could not be transformed. Artifacts of the
/// inputs that did succeed have been written regardless.
#[derive(Debug, Clone, Default)]
pub struct ActionReport {
    pub artifacts: Vec<PathBuf>,
    pub input_failures: Vec<TransformError>,
}

impl ActionReport {
    pub fn is_success(&self) -> bool {
        self.input_failures.is_empty()
    }
}

pub type ActionFuture = Pin<Box<dyn Future<Output = anyhow::Result<ActionReport>> + Send>>;

/// Zero-argument fallible unit of work attached to a task.
pub type TaskAction = Arc<dyn Fn() -> ActionFuture + Send + Sync>;

/// An action that does nothing and succeeds (grouping tasks).
pub fn noop_action() -> TaskAction {
    Arc::new(|| -> ActionFuture { Box::pin(async { Ok(ActionReport::default()) }) })
}

/// Internal node structure: the task itself plus reverse edges.
#[derive(Clone)]
struct DagNode {
    /// Direct dependencies: tasks that must succeed before this one can run.
    deps: Vec<TaskName>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskName>,
    action: TaskAction,
}

/// Registry of named tasks with declared dependencies.
///
/// Dependencies must be registered before their dependents, so the
/// registration order is always a valid topological order and a cycle can
/// never be expressed.
#[derive(Clone, Default)]
pub struct TaskGraph {
    nodes: HashMap<TaskName, DagNode>,
    /// Registration order.
    order: Vec<TaskName>,
}

impl fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.order)
            .finish_non_exhaustive()
    }
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task.
    ///
    /// Fails with [`AssetdagError::DuplicateTask`] if `name` is already taken
    /// and with [`AssetdagError::UnknownDependency`] if any dependency has not
    /// been registered yet.
    pub fn add_task<N, I, D>(&mut self, name: N, deps: I, action: TaskAction) -> Result<()>
    where
        N: Into<TaskName>,
        I: IntoIterator<Item = D>,
        D: Into<TaskName>,
    {
        let name = name.into();
        if self.nodes.contains_key(&name) {
            return Err(AssetdagError::DuplicateTask(name));
        }

        let mut unique: Vec<TaskName> = Vec::new();
        for dep in deps {
            let dep = dep.into();
            if !self.nodes.contains_key(&dep) {
                return Err(AssetdagError::UnknownDependency {
                    task: name,
                    dependency: dep,
                });
            }
            if !unique.contains(&dep) {
                unique.push(dep);
            }
        }

        for dep in &unique {
            if let Some(dep_node) = self.nodes.get_mut(dep) {
                dep_node.dependents.push(name.clone());
            }
        }

        debug!(task = %name, deps = ?unique, "registered task");
        self.nodes.insert(
            name.clone(),
            DagNode {
                deps: unique,
                dependents: Vec::new(),
                action,
            },
        );
        self.order.push(name);
        Ok(())
    }

    /// Register a task without an action of its own.
    pub fn add_group<N, I, D>(&mut self, name: N, deps: I) -> Result<()>
    where
        N: Into<TaskName>,
        I: IntoIterator<Item = D>,
        D: Into<TaskName>,
    {
        self.add_task(name, deps, noop_action())
    }

    /// All task names, in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    pub fn action_of(&self, name: &str) -> Option<TaskAction> {
        self.nodes.get(name).map(|n| Arc::clone(&n.action))
    }

    /// The tasks a run started from `starting` must execute: the starting
    /// tasks plus all of their transitive dependencies. An empty `starting`
    /// list selects the whole graph.
    pub fn run_set(&self, starting: &[TaskName]) -> Result<HashSet<TaskName>> {
        if starting.is_empty() {
            return Ok(self.order.iter().cloned().collect());
        }

        let mut set = HashSet::new();
        let mut stack: Vec<TaskName> = Vec::new();
        for name in starting {
            if !self.contains(name) {
                return Err(AssetdagError::TaskNotFound(name.clone()));
            }
            stack.push(name.clone());
        }

        while let Some(name) = stack.pop() {
            if !set.insert(name.clone()) {
                continue;
            }
            stack.extend(self.dependencies_of(&name).iter().cloned());
        }

        Ok(set)
    }

    /// Execute the tasks selected by `starting` (see [`TaskGraph::run_set`]).
    ///
    /// Independent tasks run concurrently on the tokio runtime; a task starts
    /// only after all of its dependencies succeeded. Returns one
    /// [`BuildResult`] per task in the run, in completion order.
    pub async fn run(
        &self,
        starting: &[TaskName],
        cancel: CancellationToken,
    ) -> Result<Vec<BuildResult>> {
        let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
        let executor = RealExecutorBackend::new(rt_tx);
        self.run_with_executor(starting, cancel, rt_rx, executor)
            .await
    }

    /// Like [`TaskGraph::run`], with a caller-supplied executor and event
    /// channel (tests plug in fake executors here).
    pub async fn run_with_executor<E: ExecutorBackend>(
        &self,
        starting: &[TaskName],
        cancel: CancellationToken,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
    ) -> Result<Vec<BuildResult>> {
        let run_set = self.run_set(starting)?;
        let scheduler = Scheduler::from_graph(self);
        let core = CoreRuntime::new(scheduler);
        let runtime = Runtime::new(core, event_rx, executor, cancel);
        runtime.run(run_set).await
    }
}
