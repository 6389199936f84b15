// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::BuildMode;

/// Command-line arguments for `assetdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "assetdag",
    version,
    about = "Build front-end assets from a task graph, once or on every change.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the project file (TOML). Its directory is the project root.
    #[arg(long, global = true, value_name = "PATH", default_value = "Assetdag.toml")]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ASSETDAG_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Clear the output root and build everything once.
    Build {
        /// Build mode; defaults to `[config].mode`.
        #[arg(long, value_enum)]
        mode: Option<BuildMode>,

        /// Only build these tasks (and what they depend on). Repeatable.
        /// The output root is not cleared for partial builds.
        #[arg(long = "task", value_name = "NAME")]
        tasks: Vec<String>,

        /// Parse + validate, print the plan, but don't build anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Development build, then rebuild on every change until Ctrl-C.
    Watch,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
