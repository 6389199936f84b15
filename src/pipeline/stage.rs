// src/pipeline/stage.rs

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::config::StageCondition;
use crate::types::{BuildMode, ContentKind};

/// One unit of content flowing through a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Output path relative to the output root (`css/main.css`).
    pub path: PathBuf,
    /// Project-relative source this asset came from. For bundles this is
    /// the bundle's own output path.
    pub source: PathBuf,
    pub kind: ContentKind,
    pub bytes: Vec<u8>,
}

impl Asset {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        let path = path.into();
        let kind = ContentKind::from_extension(&path);
        Self {
            path,
            source: source.into(),
            kind,
            bytes,
        }
    }

    /// Replace the extension of the output path and update the kind with it.
    pub fn rename_ext(&mut self, ext: &str) {
        self.path.set_extension(ext);
        self.kind = ContentKind::new(ext);
    }
}

/// One input failed one stage.
///
/// Never aborts a batch: the pipeline records it and moves on to the next
/// input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{stage} {}: {message}", .path.display())]
pub struct TransformError {
    pub stage: String,
    pub path: PathBuf,
    pub message: String,
}

impl TransformError {
    pub fn new(
        stage: impl Into<String>,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn for_asset(stage: &str, asset: &Asset, message: impl Into<String>) -> Self {
        Self::new(stage, &asset.source, message)
    }
}

pub type StageFuture<'a> = Pin<Box<dyn Future<Output = Result<Asset, TransformError>> + Send + 'a>>;

/// A single stateless content transformation.
///
/// Implementations must be reusable across invocations and safe to call from
/// several pipelines at once.
pub trait TransformStage: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn input_kind(&self) -> ContentKind {
        ContentKind::any()
    }

    fn output_kind(&self) -> ContentKind {
        self.input_kind()
    }

    /// Extension the stage gives its output, if it renames the asset.
    fn output_extension(&self) -> Option<&str> {
        None
    }

    fn apply<'a>(&'a self, asset: Asset) -> StageFuture<'a>;
}

/// A stage plus the mode predicate deciding whether it runs.
#[derive(Debug, Clone)]
pub struct ConditionalStage {
    stage: Arc<dyn TransformStage>,
    when: Option<StageCondition>,
}

impl ConditionalStage {
    pub fn always(stage: Arc<dyn TransformStage>) -> Self {
        Self { stage, when: None }
    }

    pub fn when(stage: Arc<dyn TransformStage>, when: StageCondition) -> Self {
        Self {
            stage,
            when: Some(when),
        }
    }

    pub fn with_condition(stage: Arc<dyn TransformStage>, when: Option<StageCondition>) -> Self {
        Self { stage, when }
    }

    pub fn is_active(&self, mode: BuildMode) -> bool {
        self.when.is_none_or(|w| w.holds(mode))
    }

    pub fn stage(&self) -> &dyn TransformStage {
        self.stage.as_ref()
    }

    pub fn name(&self) -> &str {
        self.stage.name()
    }
}

/// Display form of a project-relative path (always forward slashes).
pub(crate) fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
