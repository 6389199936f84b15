// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::types::{BuildMode, TaskName};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// output_root = "dist"
/// debounce_ms = 150
///
/// [default]
/// exclude = ["**/*.tmp"]
///
/// [task.styles]
/// sources = ["src/SCSS/**/*.scss"]
/// dest = "css"
/// stages = [
///   { name = "sass", kind = "command", cmd = "sass --stdin", input = "scss", output = "css", rename_ext = "css" },
///   { kind = "concat", file = "main.css" },
///   { kind = "minify", when = "production" },
/// ]
/// ```
///
/// All sections are optional and have reasonable defaults. This is the
/// unvalidated form; see [`ConfigFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Global behaviour config from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Defaults merged into every task from `[default]`.
    #[serde(default)]
    pub default: DefaultSection,

    /// All tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>` (see `validate.rs`), so
/// holders can rely on: known dependencies, no cycles, compilable globs and
/// compatible stage chains.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub default: DefaultSection,
    pub task: BTreeMap<String, TaskConfig>,
    /// Task names in dependency order (every task after all of its deps).
    order: Vec<TaskName>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        default: DefaultSection,
        task: BTreeMap<String, TaskConfig>,
        order: Vec<TaskName>,
    ) -> Self {
        Self {
            config,
            default,
            task,
            order,
        }
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskConfig> {
        &self.task
    }

    pub fn default_section(&self) -> &DefaultSection {
        &self.default
    }

    /// Task names in an order where dependencies always come first.
    pub fn topological_order(&self) -> &[TaskName] {
        &self.order
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Directory (relative to the project root) that receives all artifacts.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Debounce window for watch mode, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Mode used by `build` when `--mode` is not given.
    #[serde(default)]
    pub mode: BuildMode,
}

fn default_output_root() -> PathBuf {
    PathBuf::from("dist")
}

fn default_debounce_ms() -> u64 {
    150
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            debounce_ms: default_debounce_ms(),
            mode: BuildMode::default(),
        }
    }
}

/// `[default]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    /// Exclude patterns appended to every task's own `exclude` list.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskConfig {
    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Source globs, relative to the project root. Empty means the task is a
    /// pure grouping step with no pipeline.
    #[serde(default)]
    pub sources: Vec<String>,

    /// Task-local exclude globs.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Directory that source paths are made relative to before being written
    /// under `dest`. Defaults to the literal prefix of the first source glob.
    #[serde(default)]
    pub base: Option<PathBuf>,

    /// Destination directory under the output root.
    #[serde(default)]
    pub dest: Option<PathBuf>,

    /// Watch globs. `None` means "same as `sources`"; an empty list disables
    /// watching for this task.
    #[serde(default)]
    pub watch: Option<Vec<String>>,

    /// Ordered transform stages. Empty means plain copy.
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

impl TaskConfig {
    /// Whether this task owns a pipeline (as opposed to a grouping step).
    pub fn has_pipeline(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Effective watch globs.
    pub fn effective_watch(&self) -> &[String] {
        match &self.watch {
            Some(list) => list,
            None => &self.sources,
        }
    }

    /// Effective destination directory (relative to the output root).
    pub fn effective_dest(&self) -> &Path {
        self.dest.as_deref().unwrap_or_else(|| Path::new("."))
    }

    /// Effective base directory for relativising sources.
    pub fn effective_base(&self) -> PathBuf {
        match &self.base {
            Some(base) => base.clone(),
            None => self
                .sources
                .first()
                .map(|glob| literal_prefix(glob))
                .unwrap_or_default(),
        }
    }
}

/// Longest leading run of path components in `glob` that contain no glob
/// metacharacters, e.g. `src/js/**/*.js` -> `src/js`.
pub fn literal_prefix(glob: &str) -> PathBuf {
    let mut prefix = PathBuf::new();
    let components: Vec<&str> = glob.split('/').collect();
    // The last component names files, never a directory.
    let dir_components = &components[..components.len().saturating_sub(1)];
    for component in dir_components {
        if component.contains(['*', '?', '[', '{']) {
            break;
        }
        if !component.is_empty() {
            prefix.push(component);
        }
    }
    prefix
}

/// Resolve `.` and `..` in a relative path without touching the disk.
///
/// Returns `None` for absolute paths and for paths that climb above their
/// starting directory.
pub fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => out.push(part),
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// When a stage applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageCondition {
    Production,
    Development,
}

impl StageCondition {
    pub fn holds(self, mode: BuildMode) -> bool {
        match self {
            StageCondition::Production => mode == BuildMode::Production,
            StageCondition::Development => mode == BuildMode::Development,
        }
    }
}

/// One entry of a task's `stages = [...]` list.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StageConfig {
    /// Pipe content through an external shell command (stdin -> stdout).
    Command {
        #[serde(default)]
        name: Option<String>,
        cmd: String,
        #[serde(default)]
        input: Option<String>,
        #[serde(default)]
        output: Option<String>,
        /// Replace the asset's extension (e.g. `"css"` after a sass step).
        #[serde(default)]
        rename_ext: Option<String>,
        #[serde(default)]
        when: Option<StageCondition>,
    },
    /// Built-in comment stripping + whitespace collapsing.
    Minify {
        #[serde(default)]
        when: Option<StageCondition>,
    },
    /// Concatenate all inputs into one artifact named `file`.
    Concat {
        file: String,
        #[serde(default)]
        separator: Option<String>,
    },
}

impl StageConfig {
    pub fn display_name(&self) -> String {
        match self {
            StageConfig::Command { name: Some(n), .. } => n.clone(),
            StageConfig::Command { cmd, .. } => cmd
                .split_whitespace()
                .next()
                .unwrap_or("command")
                .to_string(),
            StageConfig::Minify { .. } => "minify".to_string(),
            StageConfig::Concat { .. } => "concat".to_string(),
        }
    }
}
