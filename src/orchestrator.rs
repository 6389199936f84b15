// src/orchestrator.rs

//! One-shot builds and watch sessions over a validated project config.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{load_and_validate, normalize_relative, project_root_for, ConfigFile};
use crate::dag::{ActionFuture, TaskAction, TaskGraph};
use crate::engine::BuildSummary;
use crate::errors::Result;
use crate::pipeline::{writer, Pipeline};
use crate::reload::{notify_best_effort, LogNotifier, ReloadNotifier};
use crate::types::{BuildMode, TaskName};
use crate::watch::{spawn_watcher, BindingAction, PathMatcher, WatchBinding, WatchController};

/// Owns the project configuration and the per-task pipelines, and drives
/// builds over them.
///
/// The build mode is an argument of every entry point and is captured by
/// the task actions of that build only; nothing about the orchestrator
/// changes while a build is running.
#[derive(Debug)]
pub struct BuildOrchestrator {
    config: ConfigFile,
    project_root: PathBuf,
    output_root: PathBuf,
    pipelines: BTreeMap<TaskName, Arc<Pipeline>>,
    notifier: Arc<dyn ReloadNotifier>,
}

impl BuildOrchestrator {
    /// Build the pipelines of every task that has sources.
    pub fn new(config: ConfigFile, project_root: impl Into<PathBuf>) -> Result<Self> {
        let project_root = project_root.into();
        let output_root = project_root.join(&config.config.output_root);

        let mut pipelines = BTreeMap::new();
        for (name, task) in config.tasks() {
            if !task.has_pipeline() {
                continue;
            }
            let pipeline = Pipeline::from_task(
                name,
                task,
                config.default_section(),
                &project_root,
                &output_root,
            )?;
            pipelines.insert(name.clone(), Arc::new(pipeline));
        }

        Ok(Self {
            config,
            project_root,
            output_root,
            pipelines,
            notifier: Arc::new(LogNotifier),
        })
    }

    /// Load and validate `path`; its directory becomes the project root.
    pub fn from_config_path(path: &Path) -> Result<Self> {
        let config = load_and_validate(path)?;
        Self::new(config, project_root_for(path))
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ReloadNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn pipeline(&self, task: &str) -> Option<&Arc<Pipeline>> {
        self.pipelines.get(task)
    }

    /// The task graph of a build in `mode`.
    ///
    /// Tasks are registered in dependency order; tasks without sources are
    /// registered as groups.
    pub fn task_graph(&self, mode: BuildMode) -> Result<TaskGraph> {
        let mut graph = TaskGraph::new();
        for name in self.config.topological_order() {
            let Some(task) = self.config.tasks().get(name) else {
                continue;
            };
            match self.pipelines.get(name) {
                Some(pipeline) => {
                    let action = self.pipeline_action(Arc::clone(pipeline), mode);
                    graph.add_task(name.clone(), task.after.iter().cloned(), action)?;
                }
                None => graph.add_group(name.clone(), task.after.iter().cloned())?,
            }
        }
        Ok(graph)
    }

    fn pipeline_action(&self, pipeline: Arc<Pipeline>, mode: BuildMode) -> TaskAction {
        let notifier = Arc::clone(&self.notifier);
        Arc::new(move || -> ActionFuture {
            let pipeline = Arc::clone(&pipeline);
            let notifier = Arc::clone(&notifier);
            Box::pin(async move {
                let report = pipeline.run(mode).await?;
                notify_best_effort(notifier.as_ref(), &report.written);
                Ok(report.into())
            })
        })
    }

    /// Clear the output root and run the whole graph in `mode`.
    ///
    /// A failure to clear the output root aborts before any task runs.
    pub async fn run_once(&self, mode: BuildMode) -> Result<BuildSummary> {
        self.run_tasks(mode, &[], CancellationToken::new()).await
    }

    /// Run `starting` (plus transitive dependencies) in `mode`; an empty
    /// list runs the whole graph.
    ///
    /// The output root is only cleared for whole-graph builds, since a
    /// partial build would otherwise delete the artifacts of tasks it does
    /// not rebuild.
    pub async fn run_tasks(
        &self,
        mode: BuildMode,
        starting: &[TaskName],
        cancel: CancellationToken,
    ) -> Result<BuildSummary> {
        let graph = self.task_graph(mode)?;
        // Resolve the run set first so an unknown task name fails before
        // anything is deleted.
        graph.run_set(starting)?;

        if starting.is_empty() {
            writer::clean_output_root(&self.output_root)?;
        }

        info!(%mode, tasks = ?starting, "build started");
        let results = graph.run(starting, cancel).await?;
        let summary = BuildSummary::new(results);
        info!(%mode, summary = %summary, "build finished");
        Ok(summary)
    }

    /// Watch bindings for every task with a non-empty watch list.
    ///
    /// A batch made only of the pipeline's own sources is rebuilt
    /// incrementally. A batch containing a watched file that is not a
    /// source itself (e.g. a stylesheet partial) rebuilds the whole
    /// pipeline.
    pub fn watch_bindings(&self, mode: BuildMode) -> Result<Vec<WatchBinding>> {
        let mut bindings = Vec::new();
        for (name, pipeline) in &self.pipelines {
            let Some(task) = self.config.tasks().get(name) else {
                continue;
            };
            let Some(matcher) = PathMatcher::for_watch(task, self.config.default_section())? else {
                continue;
            };

            let pipeline = Arc::clone(pipeline);
            let notifier = Arc::clone(&self.notifier);
            let action: BindingAction = Arc::new(move |changed: Vec<PathBuf>| -> ActionFuture {
                let pipeline = Arc::clone(&pipeline);
                let notifier = Arc::clone(&notifier);
                Box::pin(async move {
                    let incremental = changed.iter().all(|p| {
                        pipeline
                            .source_matcher()
                            .matches(&p.to_string_lossy().replace('\\', "/"))
                    });
                    let report = if incremental {
                        pipeline.execute_changed(&changed, mode).await?
                    } else {
                        pipeline.run(mode).await?
                    };
                    notify_best_effort(notifier.as_ref(), &report.written);
                    Ok(report.into())
                })
            });
            bindings.push(WatchBinding::new(name.clone(), matcher, action));
        }
        Ok(bindings)
    }

    /// Development build followed by a watch session that lasts until
    /// `cancel` fires. Returns the summary of the initial build.
    ///
    /// Failures of the initial build and of later rebuilds are reported but
    /// keep the session alive; only failing to clear the output root or to
    /// start the watcher ends it early.
    pub async fn run_watch(&self, cancel: CancellationToken) -> Result<BuildSummary> {
        let summary = self
            .run_tasks(BuildMode::Development, &[], cancel.clone())
            .await?;
        print_summary(&summary);
        if cancel.is_cancelled() {
            return Ok(summary);
        }

        let bindings = self.watch_bindings(BuildMode::Development)?;
        let debounce = Duration::from_millis(self.config.config.debounce_ms);
        let controller = Arc::new(WatchController::start(
            self.project_root.clone(),
            bindings,
            debounce,
            cancel.clone(),
        ));
        let watcher = spawn_watcher(
            self.project_root.clone(),
            self.output_root_relative(),
            Arc::clone(&controller),
            cancel.clone(),
        )?;

        info!(
            bindings = ?controller.binding_names().collect::<Vec<_>>(),
            "watching for changes; press Ctrl-C to stop"
        );
        cancel.cancelled().await;
        info!("stop requested; waiting for running rebuilds");

        watcher.stop().await;
        match Arc::try_unwrap(controller) {
            Ok(controller) => controller.join().await,
            Err(_) => warn!("watch controller still shared at shutdown"),
        }
        Ok(summary)
    }

    fn output_root_relative(&self) -> PathBuf {
        let configured = &self.config.config.output_root;
        normalize_relative(configured).unwrap_or_else(|| configured.clone())
    }

    /// Human-readable build plan for `--dry-run`.
    pub fn plan(&self, mode: BuildMode) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "assetdag dry-run ({mode})");
        let _ = writeln!(out, "  output_root = {}", self.output_root.display());
        let _ = writeln!(out, "  debounce_ms = {}", self.config.config.debounce_ms);
        let _ = writeln!(out);
        let _ = writeln!(out, "tasks ({}):", self.config.tasks().len());
        for name in self.config.topological_order() {
            let Some(task) = self.config.tasks().get(name) else {
                continue;
            };
            let _ = writeln!(out, "  - {name}");
            if !task.after.is_empty() {
                let _ = writeln!(out, "      after: {:?}", task.after);
            }
            match self.pipelines.get(name) {
                Some(pipeline) => {
                    let _ = writeln!(out, "      sources: {:?}", task.sources);
                    let _ = writeln!(out, "      dest: {}", task.effective_dest().display());
                    let stages = pipeline.active_stage_names(mode);
                    if stages.is_empty() {
                        let _ = writeln!(out, "      stages: (copy)");
                    } else {
                        let _ = writeln!(out, "      stages: {}", stages.join(" -> "));
                    }
                    let watch = task.effective_watch();
                    if !watch.is_empty() {
                        let _ = writeln!(out, "      watch: {:?}", watch);
                    }
                }
                None => {
                    let _ = writeln!(out, "      (group)");
                }
            }
        }
        out
    }
}

/// Print one line per failed input and unsuccessful task, then the totals.
pub fn print_summary(summary: &BuildSummary) {
    for line in summary.failure_lines() {
        println!("{line}");
    }
    println!("{summary}");
}
