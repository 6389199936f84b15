// src/pipeline/mod.rs

//! Transform pipelines.
//!
//! A [`Pipeline`] turns the source files of one task into artifacts under the
//! output root:
//!
//! - [`stage`] defines the [`TransformStage`] contract, [`Asset`] and
//!   [`TransformError`].
//! - [`builtin`] and [`command`] provide the stage implementations.
//! - [`writer`] performs atomic artifact writes and output-root clearing.
//!
//! Stages before an optional `concat` run per input; the surviving inputs are
//! then bundled into a single asset that the remaining stages transform.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::model::{DefaultSection, StageConfig, TaskConfig};
use crate::config::validate::stage_kinds;
use crate::dag::ActionReport;
use crate::errors::{AssetdagError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::{BuildMode, ContentKind, TaskName};
use crate::watch::patterns::{collect_matching_files, PathMatcher};

pub mod builtin;
pub mod command;
pub mod stage;
pub mod writer;

pub use builtin::Minify;
pub use command::CommandStage;
pub use stage::{Asset, ConditionalStage, StageFuture, TransformError, TransformStage};

/// Where a pipeline reads from and writes to.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    /// Directory all source paths are relative to.
    pub project_root: PathBuf,
    /// Directory all artifacts are written under.
    pub output_root: PathBuf,
    /// Source paths are made relative to this (project-relative) directory.
    pub base: PathBuf,
    /// Artifacts go to this directory below the output root.
    pub dest: PathBuf,
}

impl OutputLayout {
    /// Output-root-relative path of the artifact produced from `source`
    /// before any stage renamed it.
    pub fn artifact_path(&self, source: &Path) -> PathBuf {
        let rel = match source.strip_prefix(&self.base) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => source
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| source.to_path_buf()),
        };
        normalize(&self.dest.join(rel))
    }
}

/// One entry of a pipeline definition.
#[derive(Debug, Clone)]
pub enum PipelineStage {
    Transform(ConditionalStage),
    /// Bundling barrier.
    Concat { file: String, separator: String },
}

#[derive(Debug, Clone)]
struct Bundle {
    file: String,
    separator: String,
}

/// Outcome of one pipeline invocation.
///
/// Transform failures are collected here instead of being returned as
/// errors: a batch with failures still writes the artifacts of its
/// successful inputs.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Absolute paths of the artifacts written.
    pub written: Vec<PathBuf>,
    /// Absolute paths of artifacts removed because their source is gone.
    pub removed: Vec<PathBuf>,
    pub failures: Vec<TransformError>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn merge(&mut self, other: PipelineReport) {
        self.written.extend(other.written);
        self.removed.extend(other.removed);
        self.failures.extend(other.failures);
    }
}

impl From<PipelineReport> for ActionReport {
    fn from(report: PipelineReport) -> Self {
        ActionReport {
            artifacts: report.written,
            input_failures: report.failures,
        }
    }
}

/// Ordered chain of transform stages bound to a set of source files.
#[derive(Debug, Clone)]
pub struct Pipeline {
    task: TaskName,
    sources: PathMatcher,
    layout: OutputLayout,
    per_input: Vec<ConditionalStage>,
    bundle: Option<Bundle>,
    per_bundle: Vec<ConditionalStage>,
    fs: Arc<dyn FileSystem>,
}

impl Pipeline {
    /// Assemble a pipeline.
    ///
    /// Fails with a configuration error if there is more than one `Concat`
    /// or if, in either build mode, a stage cannot consume what the active
    /// stage before it produces.
    pub fn new(
        task: impl Into<TaskName>,
        sources: PathMatcher,
        layout: OutputLayout,
        stages: Vec<PipelineStage>,
    ) -> Result<Self> {
        let task = task.into();
        check_chain(&task, &stages)?;

        let mut per_input = Vec::new();
        let mut bundle = None;
        let mut per_bundle = Vec::new();
        for stage in stages {
            match stage {
                PipelineStage::Transform(s) if bundle.is_none() => per_input.push(s),
                PipelineStage::Transform(s) => per_bundle.push(s),
                PipelineStage::Concat { file, separator } => {
                    bundle = Some(Bundle { file, separator })
                }
            }
        }

        Ok(Self {
            task,
            sources,
            layout,
            per_input,
            bundle,
            per_bundle,
            fs: Arc::new(RealFileSystem),
        })
    }

    /// Build the pipeline described by a `[task.<name>]` section.
    pub fn from_task(
        name: &str,
        task: &TaskConfig,
        defaults: &DefaultSection,
        project_root: &Path,
        output_root: &Path,
    ) -> Result<Self> {
        let sources = PathMatcher::for_sources(task, defaults)?;
        let layout = OutputLayout {
            project_root: project_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
            base: task.effective_base(),
            dest: task.effective_dest().to_path_buf(),
        };

        let mut stages = Vec::with_capacity(task.stages.len());
        for config in &task.stages {
            let stage = match config {
                StageConfig::Command {
                    cmd,
                    rename_ext,
                    when,
                    ..
                } => {
                    let (input, output) = stage_kinds(config);
                    let command = CommandStage::new(config.display_name(), cmd, project_root)
                        .with_kinds(input, output)
                        .with_rename_ext(rename_ext.clone());
                    PipelineStage::Transform(ConditionalStage::with_condition(
                        Arc::new(command),
                        *when,
                    ))
                }
                StageConfig::Minify { when } => PipelineStage::Transform(
                    ConditionalStage::with_condition(Arc::new(Minify::new()?), *when),
                ),
                StageConfig::Concat { file, separator } => PipelineStage::Concat {
                    file: file.clone(),
                    separator: separator.clone().unwrap_or_else(|| "\n".to_string()),
                },
            };
            stages.push(stage);
        }

        Self::new(name, sources, layout, stages)
    }

    /// Replace the filesystem used for source discovery.
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Whether the pipeline bundles its inputs into one artifact.
    pub fn is_bundling(&self) -> bool {
        self.bundle.is_some()
    }

    pub fn source_matcher(&self) -> &PathMatcher {
        &self.sources
    }

    /// Names of the stages that run in `mode`, in order.
    pub fn active_stage_names(&self, mode: BuildMode) -> Vec<String> {
        let mut names: Vec<String> = self
            .per_input
            .iter()
            .filter(|s| s.is_active(mode))
            .map(|s| s.name().to_string())
            .collect();
        if let Some(bundle) = &self.bundle {
            names.push(format!("concat({})", bundle.file));
            names.extend(
                self.per_bundle
                    .iter()
                    .filter(|s| s.is_active(mode))
                    .map(|s| s.name().to_string()),
            );
        }
        names
    }

    /// Every source file currently matched, project-relative, in source
    /// pattern order.
    pub fn collect_sources(&self) -> Result<Vec<PathBuf>> {
        let files = collect_matching_files(self.fs.as_ref(), &self.layout.project_root, &self.sources)?;
        Ok(files)
    }

    /// Collect the sources and run them all.
    pub async fn run(&self, mode: BuildMode) -> Result<PipelineReport> {
        let inputs = self.collect_sources()?;
        debug!(task = %self.task, inputs = inputs.len(), "collected pipeline sources");
        self.execute(&inputs, mode).await
    }

    /// Run the stages active in `mode` over `inputs` (project-relative).
    ///
    /// Transform failures are isolated per input and returned in the report;
    /// only write failures abort the call.
    pub async fn execute(&self, inputs: &[PathBuf], mode: BuildMode) -> Result<PipelineReport> {
        match &self.bundle {
            None => self.execute_per_file(inputs, mode).await,
            Some(bundle) => self.execute_bundle(bundle, inputs, mode).await,
        }
    }

    /// Incremental variant of [`Pipeline::execute`] for watch mode.
    ///
    /// Per-file pipelines process only the changed files that still exist and
    /// remove the artifacts of deleted ones. Bundling pipelines re-collect
    /// every source, since the bundle depends on all of them.
    pub async fn execute_changed(
        &self,
        changed: &[PathBuf],
        mode: BuildMode,
    ) -> Result<PipelineReport> {
        if self.is_bundling() {
            return self.run(mode).await;
        }

        let mut report = PipelineReport::default();
        let mut existing = Vec::new();
        for source in changed {
            let rel = source.to_string_lossy().replace('\\', "/");
            if !self.sources.matches(&rel) {
                continue;
            }
            if self.fs.is_file(&self.layout.project_root.join(source)) {
                existing.push(source.clone());
                continue;
            }

            let artifact = self.layout.output_root.join(self.predicted_artifact(source, mode));
            match writer::remove_artifact(&artifact) {
                Ok(true) => {
                    info!(task = %self.task, path = ?artifact, "source deleted; removed artifact");
                    report.removed.push(artifact);
                }
                Ok(false) => {}
                Err(source) => {
                    return Err(AssetdagError::OutputWrite {
                        path: artifact,
                        source,
                    });
                }
            }
        }

        report.merge(self.execute_per_file(&existing, mode).await?);
        Ok(report)
    }

    /// Artifact path `source` maps to in `mode`, taking extension renames of
    /// the active stages into account.
    fn predicted_artifact(&self, source: &Path, mode: BuildMode) -> PathBuf {
        let mut path = self.layout.artifact_path(source);
        for stage in self.per_input.iter().filter(|s| s.is_active(mode)) {
            if let Some(ext) = stage.stage().output_extension() {
                path.set_extension(ext);
            }
        }
        path
    }

    async fn execute_per_file(&self, inputs: &[PathBuf], mode: BuildMode) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        for source in inputs {
            match self.transform_input(source, mode).await {
                Ok(asset) => {
                    let target = self.layout.output_root.join(&asset.path);
                    report.written.push(writer::write_artifact(target, asset.bytes).await?);
                }
                Err(err) => {
                    warn!(task = %self.task, stage = %err.stage, path = ?err.path, error = %err.message, "input failed");
                    report.failures.push(err);
                }
            }
        }
        Ok(report)
    }

    async fn execute_bundle(
        &self,
        bundle: &Bundle,
        inputs: &[PathBuf],
        mode: BuildMode,
    ) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        let mut members = Vec::with_capacity(inputs.len());
        for source in inputs {
            match self.transform_input(source, mode).await {
                Ok(asset) => members.push(asset),
                Err(err) => {
                    warn!(task = %self.task, stage = %err.stage, path = ?err.path, error = %err.message, "bundle member failed");
                    report.failures.push(err);
                }
            }
        }

        // A partial bundle would replace a good one from an earlier build.
        if !report.failures.is_empty() {
            warn!(task = %self.task, bundle = %bundle.file, "not writing bundle; some members failed");
            return Ok(report);
        }
        if members.is_empty() {
            debug!(task = %self.task, bundle = %bundle.file, "no inputs; bundle not written");
            return Ok(report);
        }

        let kind = common_kind(&members);
        let mut bytes = Vec::new();
        for (i, member) in members.into_iter().enumerate() {
            if i > 0 {
                bytes.extend_from_slice(bundle.separator.as_bytes());
            }
            bytes.extend(member.bytes);
        }

        let path = normalize(&self.layout.dest.join(&bundle.file));
        let mut asset = Asset::new(path.clone(), path, bytes);
        if !kind.is_any() {
            asset.kind = kind;
        }

        match apply_chain(&self.per_bundle, asset, mode).await {
            Ok(asset) => {
                let target = self.layout.output_root.join(&asset.path);
                report.written.push(writer::write_artifact(target, asset.bytes).await?);
            }
            Err(err) => {
                warn!(task = %self.task, stage = %err.stage, path = ?err.path, error = %err.message, "bundle failed");
                report.failures.push(err);
            }
        }
        Ok(report)
    }

    async fn transform_input(&self, source: &Path, mode: BuildMode) -> std::result::Result<Asset, TransformError> {
        let abs = self.layout.project_root.join(source);
        let bytes = tokio::fs::read(&abs)
            .await
            .map_err(|err| TransformError::new("read", source, err.to_string()))?;
        let asset = Asset::new(self.layout.artifact_path(source), source, bytes);
        apply_chain(&self.per_input, asset, mode).await
    }
}

async fn apply_chain(
    stages: &[ConditionalStage],
    mut asset: Asset,
    mode: BuildMode,
) -> std::result::Result<Asset, TransformError> {
    for stage in stages.iter().filter(|s| s.is_active(mode)) {
        debug!(stage = %stage.name(), path = ?asset.source, "applying stage");
        asset = stage.stage().apply(asset).await?;
    }
    Ok(asset)
}

/// The kind shared by all members, or the wildcard if they differ.
fn common_kind(members: &[Asset]) -> ContentKind {
    match members.split_first() {
        Some((first, rest)) if rest.iter().all(|m| m.kind == first.kind) => first.kind.clone(),
        _ => ContentKind::any(),
    }
}

/// Drop `.` components so `./css/a.css` and `css/a.css` are the same path.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect()
}

/// Reject definitions whose adjacent stages disagree on content kind.
fn check_chain(task: &str, stages: &[PipelineStage]) -> Result<()> {
    let concats = stages
        .iter()
        .filter(|s| matches!(s, PipelineStage::Concat { .. }))
        .count();
    if concats > 1 {
        return Err(AssetdagError::ConfigError(format!(
            "pipeline '{task}' has {concats} concat stages; at most one is allowed"
        )));
    }

    for mode in [BuildMode::Development, BuildMode::Production] {
        let mut previous: Option<(String, ContentKind)> = None;
        for stage in stages {
            let (name, input, output) = match stage {
                PipelineStage::Transform(s) if !s.is_active(mode) => continue,
                PipelineStage::Transform(s) => (
                    s.name().to_string(),
                    s.stage().input_kind(),
                    s.stage().output_kind(),
                ),
                PipelineStage::Concat { .. } => {
                    ("concat".to_string(), ContentKind::any(), ContentKind::any())
                }
            };
            if let Some((prev_name, produced)) = &previous {
                if !produced.feeds(&input) {
                    return Err(AssetdagError::ConfigError(format!(
                        "pipeline '{task}': stage '{prev_name}' produces '{produced}' but stage '{name}' expects '{input}' ({mode} mode)"
                    )));
                }
            }
            previous = Some((name, output));
        }
    }
    Ok(())
}
