// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state (scheduler + collected results)
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledTask`s to the executor
//! - turning the caller's cancellation token into an event
//!
//! The core is unit tested without any Tokio, channels, filesystem, or
//! processes.

use std::collections::HashSet;

use crate::dag::Scheduler;
use crate::engine::event_handlers::{
    handle_cancel, handle_task_completion, start_run, CoreStep,
};
use crate::engine::{BuildResult, RuntimeEvent, TaskName, TaskStatus};

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    results: Vec<BuildResult>,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            results: Vec::new(),
        }
    }

    /// Expose whether the scheduler is idle (for tests).
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Results recorded so far, in the order tasks reached a final state.
    pub fn results(&self) -> &[BuildResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<BuildResult> {
        self.results
    }

    /// Begin a run over `run_set`.
    pub fn start(&mut self, run_set: &HashSet<TaskName>) -> CoreStep {
        start_run(&mut self.scheduler, &mut self.results, run_set)
    }

    /// Record every task of `run_set` as cancelled without starting anything.
    pub fn cancel_before_start(&mut self, run_set: &HashSet<TaskName>) {
        let mut names: Vec<&TaskName> = run_set.iter().collect();
        names.sort();
        for name in names {
            self.results
                .push(BuildResult::not_run(name.clone(), TaskStatus::Cancelled));
        }
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskCompleted(completion) => {
                handle_task_completion(&mut self.scheduler, &mut self.results, completion)
            }
            RuntimeEvent::CancelRequested => handle_cancel(&mut self.scheduler, &mut self.results),
        }
    }
}
