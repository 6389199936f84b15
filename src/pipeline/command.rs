// src/pipeline/command.rs

//! External transforms: content is piped through a shell command.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::pipeline::stage::{display_path, Asset, StageFuture, TransformError, TransformStage};
use crate::types::ContentKind;

/// How many trailing stderr lines end up in a [`TransformError`].
const STDERR_TAIL_LINES: usize = 5;

/// Runs `sh -c <cmd>` in the project root with the asset on stdin and
/// takes stdout as the transformed content.
///
/// The source path is exported as `ASSETDAG_SOURCE` so commands that need a
/// file name (e.g. for sourcemaps) can pick it up.
#[derive(Debug, Clone)]
pub struct CommandStage {
    name: String,
    cmd: String,
    input: ContentKind,
    output: ContentKind,
    rename_ext: Option<String>,
    cwd: PathBuf,
}

impl CommandStage {
    pub fn new(name: impl Into<String>, cmd: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
            input: ContentKind::any(),
            output: ContentKind::any(),
            rename_ext: None,
            cwd: cwd.into(),
        }
    }

    pub fn with_kinds(mut self, input: ContentKind, output: ContentKind) -> Self {
        self.input = input;
        self.output = output;
        self
    }

    pub fn with_rename_ext(mut self, ext: Option<String>) -> Self {
        self.rename_ext = ext;
        self
    }

    fn shell(&self) -> Command {
        let mut c = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };
        c.current_dir(&self.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        c
    }

    async fn run(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let source = display_path(&asset.source);
        debug!(stage = %self.name, path = %source, cmd = %self.cmd, "running command stage");

        let mut child = self
            .shell()
            .env("ASSETDAG_SOURCE", &source)
            .spawn()
            .map_err(|err| {
                TransformError::for_asset(&self.name, &asset, format!("failed to spawn: {err}"))
            })?;

        // Feed stdin from a separate task so a command that writes before it
        // has read everything cannot deadlock against us.
        let stdin = child.stdin.take();
        let input = std::mem::take(&mut asset.bytes);
        let writer = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        });

        let output = child.wait_with_output().await.map_err(|err| {
            TransformError::for_asset(&self.name, &asset, format!("failed to wait: {err}"))
        })?;

        match writer.await {
            Ok(Ok(())) => {}
            // A command that ignores its input closes the pipe early; its
            // exit status decides.
            Ok(Err(err)) => debug!(stage = %self.name, path = %source, error = %err, "stdin write failed"),
            Err(err) => warn!(stage = %self.name, path = %source, error = %err, "stdin writer task failed"),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransformError::for_asset(
                &self.name,
                &asset,
                format!("{} ({})", stderr_tail(&stderr), output.status),
            ));
        }

        asset.bytes = output.stdout;
        match &self.rename_ext {
            Some(ext) => asset.rename_ext(ext),
            None if !self.output.is_any() => asset.kind = self.output.clone(),
            None => {}
        }
        Ok(asset)
    }
}

impl TransformStage for CommandStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_kind(&self) -> ContentKind {
        self.input.clone()
    }

    fn output_kind(&self) -> ContentKind {
        self.output.clone()
    }

    fn output_extension(&self) -> Option<&str> {
        self.rename_ext.as_deref()
    }

    fn apply<'a>(&'a self, asset: Asset) -> StageFuture<'a> {
        Box::pin(self.run(asset))
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return "command failed".to_string();
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}
