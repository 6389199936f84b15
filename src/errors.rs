// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Per-input transform failures are not part of this enum: they are reported
//! as [`crate::pipeline::TransformError`] values inside a pipeline report and
//! never abort a build on their own.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Duplicate task: {0}")]
    DuplicateTask(String),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to clear output root {path:?}: {source}")]
    CleanFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to update artifact {path:?}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AssetdagError {
    /// Structural problems with the task graph or project file, detected
    /// before any action runs.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            AssetdagError::ConfigError(_)
                | AssetdagError::DuplicateTask(_)
                | AssetdagError::UnknownDependency { .. }
                | AssetdagError::TaskNotFound(_)
                | AssetdagError::DagCycle(_)
                | AssetdagError::TomlError(_)
        )
    }

    /// Failures to modify the output tree. These abort the whole run.
    pub fn is_output_error(&self) -> bool {
        matches!(
            self,
            AssetdagError::OutputWrite { .. } | AssetdagError::CleanFailed { .. }
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AssetdagError>;
