// src/engine/runtime.rs

use std::collections::HashSet;
use std::fmt;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::errors::Result;
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::{BuildResult, CoreCommand, CoreStep, RuntimeEvent, TaskName};

/// Drives one task-graph run in response to `RuntimeEvent`s, and delegates
/// action execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// run semantics. This struct handles async IO: reading events from
/// channels, watching the cancellation token and dispatching tasks to the
/// executor.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    cancel: CancellationToken,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            cancel,
        }
    }

    /// Main event loop.
    ///
    /// - Starts the run and dispatches the initially ready tasks.
    /// - Consumes `RuntimeEvent`s from `event_rx` and feeds them into the core.
    /// - Turns the first cancellation of the token into `CancelRequested`.
    /// - Returns once every task of the run reached a final state.
    pub async fn run(mut self, run_set: HashSet<TaskName>) -> Result<Vec<BuildResult>> {
        if self.cancel.is_cancelled() {
            info!("run cancelled before it started");
            self.core.cancel_before_start(&run_set);
            return Ok(self.core.into_results());
        }

        info!(tasks = run_set.len(), "task graph run started");

        let step = self.core.start(&run_set);
        let mut keep_running = self.apply(step).await?;
        let mut cancel_seen = false;

        while keep_running {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    RuntimeEvent::CancelRequested
                }
                received = self.event_rx.recv() => match received {
                    Some(e) => e,
                    None => {
                        warn!("runtime event channel closed while tasks were still running");
                        return Err(anyhow!("executor stopped before the run finished").into());
                    }
                },
            };

            debug!(?event, "runtime received event");

            // Feed the event into the pure core and execute what it asks for.
            let step = self.core.step(event);
            keep_running = self.apply(step).await?;
        }

        info!(results = self.core.results().len(), "task graph run finished");
        Ok(self.core.into_results())
    }

    /// Execute the commands of one core step; returns `keep_running`.
    async fn apply(&mut self, step: CoreStep) -> Result<bool> {
        for command in step.commands {
            match command {
                CoreCommand::DispatchTasks(tasks) => self.spawn_ready(tasks).await?,
            }
        }
        Ok(step.keep_running)
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        debug!(?names, "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }
}
