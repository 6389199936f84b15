// src/config/validate.rs

use globset::Glob;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{
    literal_prefix, normalize_relative, ConfigFile, RawConfigFile, StageConfig, TaskConfig,
};
use crate::errors::{AssetdagError, Result};
use crate::types::{BuildMode, ContentKind, TaskName};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AssetdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let order = validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.config,
            raw.default,
            raw.task,
            order,
        ))
    }
}

/// Validate everything and return the task names in dependency order.
fn validate_raw_config(cfg: &RawConfigFile) -> Result<Vec<TaskName>> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_output_root(cfg)?;
    validate_task_dependencies(cfg)?;
    let order = validate_dag(cfg)?;
    for (name, task) in cfg.task.iter() {
        validate_globs(name, task, &cfg.default.exclude)?;
        validate_stages(name, task)?;
    }
    Ok(order)
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(AssetdagError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.debounce_ms == 0 {
        return Err(AssetdagError::ConfigError(
            "[config].debounce_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.config.output_root.as_os_str().is_empty() {
        return Err(AssetdagError::ConfigError(
            "[config].output_root must not be empty".to_string(),
        ));
    }

    Ok(())
}

/// The output root is deleted before every full build, so it must be a
/// directory strictly inside the project that holds no sources or watched
/// files.
fn validate_output_root(cfg: &RawConfigFile) -> Result<()> {
    let configured = &cfg.config.output_root;
    let Some(root) = normalize_relative(configured) else {
        return Err(AssetdagError::ConfigError(format!(
            "[config].output_root '{}' must be a relative path inside the project",
            configured.display()
        )));
    };
    if root.as_os_str().is_empty() {
        return Err(AssetdagError::ConfigError(format!(
            "[config].output_root '{}' must not be the project root",
            configured.display()
        )));
    }

    for (name, task) in cfg.task.iter() {
        for glob in task.sources.iter().chain(task.effective_watch().iter()) {
            let inside = normalize_relative(&literal_prefix(glob))
                .is_some_and(|prefix| prefix.starts_with(&root));
            if inside {
                return Err(AssetdagError::ConfigError(format!(
                    "task '{}': glob '{}' lies inside output_root '{}', which is cleared on every build",
                    name,
                    glob,
                    configured.display()
                )));
            }
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(AssetdagError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(AssetdagError::UnknownDependency {
                    task: name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<Vec<TaskName>> {
    // Edge direction: dep -> task
    // For:
    //   [task.B]
    //   after = ["A"]
    // we add edge A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(AssetdagError::DagCycle(format!(
                "cycle detected in task DAG involving task '{}'",
                node
            )))
        }
    }
}

fn validate_globs(name: &str, task: &TaskConfig, default_exclude: &[String]) -> Result<()> {
    let all = task
        .sources
        .iter()
        .chain(task.exclude.iter())
        .chain(task.effective_watch().iter())
        .chain(default_exclude.iter());

    for pattern in all {
        if let Err(err) = Glob::new(pattern) {
            return Err(AssetdagError::ConfigError(format!(
                "task '{}' has invalid glob '{}': {}",
                name, pattern, err
            )));
        }
    }

    if !task.has_pipeline() && !task.stages.is_empty() {
        return Err(AssetdagError::ConfigError(format!(
            "task '{}' declares stages but no sources",
            name
        )));
    }

    Ok(())
}

fn validate_stages(name: &str, task: &TaskConfig) -> Result<()> {
    let concats = task
        .stages
        .iter()
        .filter(|s| matches!(s, StageConfig::Concat { .. }))
        .count();
    if concats > 1 {
        return Err(AssetdagError::ConfigError(format!(
            "task '{}' declares {} concat stages; at most one is allowed",
            name, concats
        )));
    }

    for stage in task.stages.iter() {
        if let StageConfig::Concat { file, .. } = stage {
            if file.trim().is_empty() || file.contains(['/', '\\']) {
                return Err(AssetdagError::ConfigError(format!(
                    "task '{}' has invalid concat file name '{}'",
                    name, file
                )));
            }
        }
        if let StageConfig::Command { cmd, .. } = stage {
            if cmd.trim().is_empty() {
                return Err(AssetdagError::ConfigError(format!(
                    "task '{}' has a command stage with an empty `cmd`",
                    name
                )));
            }
        }
    }

    // Conditional stages drop out of the chain in one mode, which changes
    // adjacency; check the chain as each mode will actually see it.
    for mode in [BuildMode::Development, BuildMode::Production] {
        let active: Vec<&StageConfig> = task
            .stages
            .iter()
            .filter(|s| stage_active(s, mode))
            .collect();

        for pair in active.windows(2) {
            let (_, produced) = stage_kinds(pair[0]);
            let (expected, _) = stage_kinds(pair[1]);
            if !produced.feeds(&expected) {
                return Err(AssetdagError::ConfigError(format!(
                    "task '{}': stage '{}' produces '{}' but stage '{}' expects '{}' ({} mode)",
                    name,
                    pair[0].display_name(),
                    produced,
                    pair[1].display_name(),
                    expected,
                    mode
                )));
            }
        }
    }

    Ok(())
}

fn stage_active(stage: &StageConfig, mode: BuildMode) -> bool {
    match stage {
        StageConfig::Command { when, .. } | StageConfig::Minify { when } => {
            when.is_none_or(|w| w.holds(mode))
        }
        StageConfig::Concat { .. } => true,
    }
}

/// (input kind, output kind) declared by a stage.
pub(crate) fn stage_kinds(stage: &StageConfig) -> (ContentKind, ContentKind) {
    match stage {
        StageConfig::Command { input, output, .. } => {
            let input = input.as_deref().map(ContentKind::new).unwrap_or_default();
            let output = output
                .as_deref()
                .map(ContentKind::new)
                .unwrap_or_else(|| input.clone());
            (input, output)
        }
        StageConfig::Minify { .. } | StageConfig::Concat { .. } => {
            (ContentKind::any(), ContentKind::any())
        }
    }
}
