// src/watch/patterns.rs

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::model::{literal_prefix, DefaultSection, TaskConfig};
use crate::fs::FileSystem;

/// Compiled include/exclude glob patterns.
///
/// Patterns are relative to the project root, and so are the paths passed
/// into [`PathMatcher::matches`] (e.g. `"src/SCSS/main.scss"`, always with
/// forward slashes).
#[derive(Clone)]
pub struct PathMatcher {
    include: Vec<String>,
    include_set: GlobSet,
    exclude_set: Option<GlobSet>,
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathMatcher")
            .field("include", &self.include)
            .finish_non_exhaustive()
    }
}

impl PathMatcher {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include_set = build_globset(include).context("building include globset")?;
        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };

        Ok(Self {
            include: include.to_vec(),
            include_set,
            exclude_set,
        })
    }

    /// Matcher for the files a task's pipeline consumes: `sources`, minus
    /// the task's own and the default excludes.
    pub fn for_sources(task: &TaskConfig, defaults: &DefaultSection) -> Result<Self> {
        Self::new(&task.sources, &effective_exclude(task, defaults))
    }

    /// Matcher for the files whose changes re-trigger a task, or `None` when
    /// watching is disabled for it (`watch = []` or no sources).
    pub fn for_watch(task: &TaskConfig, defaults: &DefaultSection) -> Result<Option<Self>> {
        let watch = task.effective_watch();
        if watch.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::new(watch, &effective_exclude(task, defaults))?))
    }

    pub fn patterns(&self) -> &[String] {
        &self.include
    }

    /// Returns true if the given project-relative path is included and not
    /// excluded.
    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.include_set.is_match(rel_path) {
            return false;
        }
        if let Some(exclude) = &self.exclude_set {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        true
    }

    /// Index of the first include pattern that matches `rel_path`.
    fn first_include(&self, rel_path: &str) -> usize {
        self.include_set
            .matches(rel_path)
            .into_iter()
            .min()
            .unwrap_or(usize::MAX)
    }

    /// Directories a walk has to visit to find every possible match: the
    /// literal prefixes of the include patterns, with nested ones folded
    /// into their parents.
    fn search_roots(&self) -> Vec<PathBuf> {
        let prefixes: BTreeSet<PathBuf> = self.include.iter().map(|g| literal_prefix(g)).collect();
        let mut roots: Vec<PathBuf> = Vec::new();
        for prefix in prefixes {
            if !roots.iter().any(|r| prefix.starts_with(r)) {
                roots.push(prefix);
            }
        }
        roots
    }
}

fn effective_exclude(task: &TaskConfig, defaults: &DefaultSection) -> Vec<String> {
    let mut exclude = task.exclude.clone();
    exclude.extend(defaults.exclude.iter().cloned());
    exclude
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Collect all files under `root` that `matcher` accepts, as
/// project-relative paths.
///
/// Files are grouped by the first include pattern they match, in the order
/// the patterns are declared, and sorted by path within a group. Bundles
/// concatenate in this order.
pub fn collect_matching_files(
    fs: &dyn FileSystem,
    root: &Path,
    matcher: &PathMatcher,
) -> Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();
    let mut stack: Vec<PathBuf> = matcher
        .search_roots()
        .into_iter()
        .map(|prefix| root.join(prefix))
        .filter(|dir| fs.is_dir(dir))
        .collect();

    while let Some(dir) = stack.pop() {
        for path in fs.read_dir(&dir)? {
            if fs.is_dir(&path) {
                stack.push(path);
            } else if fs.is_file(&path) {
                if let Ok(rel) = path.strip_prefix(root) {
                    let rel_str = rel.to_string_lossy().replace('\\', "/");
                    if matcher.matches(&rel_str) {
                        files.insert(rel.to_path_buf());
                    }
                }
            }
        }
    }

    let mut files: Vec<(usize, PathBuf)> = files
        .into_iter()
        .map(|rel| (matcher.first_include(&rel.to_string_lossy().replace('\\', "/")), rel))
        .collect();
    files.sort();
    Ok(files.into_iter().map(|(_, rel)| rel).collect())
}
