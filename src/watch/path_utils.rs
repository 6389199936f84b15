// src/watch/path_utils.rs

//! Path helpers for turning watcher events into project-relative paths.

use std::path::Path;

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. due to symlinks or different absolute prefixes),
///   we canonicalize both paths and try again. A deleted file cannot be
///   canonicalized, so its parent directory is used instead.
///
/// Returns `None` if the path cannot be related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(slashed(rel));
    }

    let root_canon = root.canonicalize().ok()?;
    let path_canon = match path.canonicalize() {
        Ok(p) => p,
        Err(_) => {
            let parent = path.parent()?.canonicalize().ok()?;
            parent.join(path.file_name()?)
        }
    };

    path_canon.strip_prefix(&root_canon).ok().map(slashed)
}

/// Whether a project-relative path lies inside `dir` (also project-relative).
pub fn is_within(rel_path: &str, dir: &Path) -> bool {
    !dir.as_os_str().is_empty() && Path::new(rel_path).starts_with(dir)
}

fn slashed(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}
