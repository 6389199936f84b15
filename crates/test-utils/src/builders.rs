use std::collections::BTreeMap;
use std::path::PathBuf;

use assetdag::config::{
    ConfigFile, ConfigSection, DefaultSection, RawConfigFile, StageCondition, StageConfig,
    TaskConfig,
};
use assetdag::dag::{noop_action, TaskGraph};
use assetdag::errors::Result;
use assetdag::types::BuildMode;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                default: DefaultSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_default_exclude(mut self, pattern: &str) -> Self {
        self.config.default.exclude.push(pattern.to_string());
        self
    }

    pub fn output_root(mut self, dir: &str) -> Self {
        self.config.config.output_root = PathBuf::from(dir);
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.config.debounce_ms = ms;
        self
    }

    pub fn mode(mut self, mode: BuildMode) -> Self {
        self.config.config.mode = mode;
        self
    }

    /// Validate; configuration errors are returned for tests that expect them.
    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    /// A pipeline task reading `sources`.
    pub fn new(sources: &[&str]) -> Self {
        Self {
            task: TaskConfig {
                sources: sources.iter().map(|s| s.to_string()).collect(),
                ..TaskConfig::default()
            },
        }
    }

    /// A task without sources: succeeds once its dependencies do.
    pub fn group() -> Self {
        Self::new(&[])
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.task.exclude.push(pattern.to_string());
        self
    }

    pub fn base(mut self, dir: &str) -> Self {
        self.task.base = Some(PathBuf::from(dir));
        self
    }

    pub fn dest(mut self, dir: &str) -> Self {
        self.task.dest = Some(PathBuf::from(dir));
        self
    }

    pub fn watch(mut self, pattern: &str) -> Self {
        self.task
            .watch
            .get_or_insert_with(Vec::new)
            .push(pattern.to_string());
        self
    }

    pub fn no_watch(mut self) -> Self {
        self.task.watch = Some(Vec::new());
        self
    }

    pub fn command(mut self, name: &str, cmd: &str) -> Self {
        self.task.stages.push(StageConfig::Command {
            name: Some(name.to_string()),
            cmd: cmd.to_string(),
            input: None,
            output: None,
            rename_ext: None,
            when: None,
        });
        self
    }

    pub fn minify(mut self, when: Option<StageCondition>) -> Self {
        self.task.stages.push(StageConfig::Minify { when });
        self
    }

    pub fn concat(mut self, file: &str) -> Self {
        self.task.stages.push(StageConfig::Concat {
            file: file.to_string(),
            separator: None,
        });
        self
    }

    pub fn stage(mut self, stage: StageConfig) -> Self {
        self.task.stages.push(stage);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// A graph of no-op tasks; `edges` lists `(task, deps)` in registration order.
pub fn noop_graph(edges: &[(&str, &[&str])]) -> TaskGraph {
    let mut graph = TaskGraph::new();
    for (name, deps) in edges {
        graph
            .add_task(*name, deps.iter().copied(), noop_action())
            .expect("valid noop graph");
    }
    graph
}
