// src/pipeline/writer.rs

//! Artifact writes and output-root housekeeping.
//!
//! Every artifact is written to a temporary file in its destination
//! directory and then renamed over the target, so a reader sees either the
//! previous or the new content, never a partial file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::errors::{AssetdagError, Result};

/// Write `bytes` to `target` atomically, creating parent directories.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|err| err.error)?;
    Ok(())
}

/// Async wrapper around [`write_atomic`] for use inside task actions.
pub async fn write_artifact(target: PathBuf, bytes: Vec<u8>) -> Result<PathBuf> {
    let path = target.clone();
    tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
        .await
        .context("artifact writer task failed")?
        .map_err(|source| AssetdagError::OutputWrite {
            path: target.clone(),
            source,
        })?;
    debug!(path = ?target, "artifact written");
    Ok(target)
}

/// Remove a previously written artifact. A missing file is not an error.
pub fn remove_artifact(target: &Path) -> io::Result<bool> {
    match fs::remove_file(target) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Delete the whole output root.
///
/// A root that does not exist yet is fine; anything else that prevents the
/// removal aborts with [`AssetdagError::CleanFailed`].
pub fn clean_output_root(root: &Path) -> Result<()> {
    match fs::remove_dir_all(root) {
        Ok(()) => {
            info!(path = ?root, "cleared output root");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = ?root, "output root does not exist; nothing to clear");
            Ok(())
        }
        Err(source) => Err(AssetdagError::CleanFailed {
            path: root.to_path_buf(),
            source,
        }),
    }
}
