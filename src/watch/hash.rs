// src/watch/hash.rs

//! Content hashing used to drop change events that did not change anything.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

/// Hash a file's contents; `Ok(None)` if the file does not exist.
pub fn compute_file_hash(path: &Path) -> Result<Option<String>> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("opening file for hashing: {:?}", path));
        }
    };

    let mut hasher = Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading file for hashing: {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Some(hasher.finalize().to_hex().to_string()))
}

/// Last processed content hash per file, kept in memory for one watch
/// binding.
#[derive(Debug, Default)]
pub struct ContentHashes {
    seen: HashMap<PathBuf, String>,
}

impl ContentHashes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `hash` is what was processed last for `path`.
    pub fn is_unchanged(&self, path: &Path, hash: &str) -> bool {
        self.seen.get(path).is_some_and(|h| h == hash)
    }

    pub fn record(&mut self, path: PathBuf, hash: String) {
        debug!(path = ?path, hash = %hash, "recorded content hash");
        self.seen.insert(path, hash);
    }

    pub fn forget(&mut self, path: &Path) {
        self.seen.remove(path);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
