// src/config/mod.rs

//! Configuration loading and validation for assetdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate graph, glob and stage-chain invariants (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str, project_root_for};
pub use model::{
    literal_prefix, normalize_relative, ConfigFile, ConfigSection, DefaultSection, RawConfigFile,
    StageCondition, StageConfig, TaskConfig,
};
