// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod reload;
pub mod types;
pub mod watch;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::cli::{CliArgs, Command};
use crate::orchestrator::{print_summary, BuildOrchestrator};

/// High-level entry point used by `main.rs`.
///
/// Returns whether the requested work succeeded; `main` turns `false` into
/// a nonzero exit code. Configuration and output-root errors come back as
/// `Err`.
pub async fn run(args: CliArgs) -> Result<bool> {
    let orchestrator = BuildOrchestrator::from_config_path(&args.config)?;

    match args.command {
        Command::Build {
            mode,
            tasks,
            dry_run,
        } => {
            let mode = mode.unwrap_or(orchestrator.config().config.mode);
            if dry_run {
                print!("{}", orchestrator.plan(mode));
                debug!("dry-run complete (no execution)");
                return Ok(true);
            }

            let cancel = CancellationToken::new();
            spawn_ctrl_c(cancel.clone());

            let summary = orchestrator.run_tasks(mode, &tasks, cancel).await?;
            print_summary(&summary);
            Ok(summary.is_success())
        }
        Command::Watch => {
            let cancel = CancellationToken::new();
            spawn_ctrl_c(cancel.clone());

            // Failures of the initial build are already printed and do not
            // end the session.
            orchestrator.run_watch(cancel).await?;
            Ok(true)
        }
    }
}

/// Ctrl-C → cancel; running actions finish, nothing new starts.
fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => cancel.cancel(),
            Err(err) => error!(error = %err, "failed to listen for Ctrl+C"),
        }
    });
}
