// src/fs/mock.rs

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use super::FileSystem;

#[derive(Debug, Clone)]
enum MockEntry {
    File,
    Dir(BTreeSet<String>), // child names
}

/// In-memory tree of source paths for discovery tests.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file; parent directories appear implicitly.
    pub fn add_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut entries = self.lock();
        entries.insert(path.to_path_buf(), MockEntry::File);
        link_to_parent(&mut entries, path);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        // A panicking test thread must not hide the tree from later asserts.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn parent_of(path: &Path) -> Option<&Path> {
    let parent = path.parent()?;
    Some(if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    })
}

fn link_to_parent(entries: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    let (Some(parent), Some(name)) = (parent_of(path), path.file_name()) else {
        return;
    };
    let name = name.to_string_lossy().into_owned();
    let is_new = !entries.contains_key(parent);
    match entries
        .entry(parent.to_path_buf())
        .or_insert_with(|| MockEntry::Dir(BTreeSet::new()))
    {
        MockEntry::Dir(children) => {
            children.insert(name);
        }
        MockEntry::File => return,
    }
    if is_new && parent != path {
        link_to_parent(entries, parent);
    }
}

impl FileSystem for MockFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::File))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::Dir(_)))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        match self.lock().get(path) {
            Some(MockEntry::Dir(children)) => Ok(children.iter().map(|name| path.join(name)).collect()),
            _ => Err(anyhow!("not a directory: {path:?}")),
        }
    }
}
