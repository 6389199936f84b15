// tests/integration/config_errors.rs

use assetdag::config::{load_from_str, ConfigFile, StageCondition, StageConfig};
use assetdag::errors::AssetdagError;
use assetdag::orchestrator::BuildOrchestrator;
use assetdag_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};

fn validate(toml: &str) -> Result<ConfigFile, AssetdagError> {
    ConfigFile::try_from(load_from_str(toml)?)
}

#[test]
fn missing_config_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = BuildOrchestrator::from_config_path(&dir.path().join("Assetdag.toml")).unwrap_err();
    assert!(matches!(err, AssetdagError::IoError(_)));
    assert!(!err.is_configuration_error());
}

#[test]
fn malformed_toml_is_a_configuration_error() {
    let err = validate("[task.styles\nsources = [").unwrap_err();
    assert!(matches!(err, AssetdagError::TomlError(_)));
    assert!(err.is_configuration_error());
}

#[test]
fn unknown_stage_kind_is_rejected() {
    let err = validate(
        r#"
[task.styles]
sources = ["src/**/*.css"]
stages = [{ kind = "uglify" }]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, AssetdagError::TomlError(_)));
}

#[test]
fn cycle_is_rejected_before_any_work() {
    let err = ConfigFileBuilder::new()
        .with_task("a", TaskConfigBuilder::group().after("b").build())
        .with_task("b", TaskConfigBuilder::group().after("a").build())
        .try_build()
        .unwrap_err();
    assert!(matches!(err, AssetdagError::DagCycle(_)));
}

#[test]
fn unknown_dependency_names_both_tasks() {
    let err = ConfigFileBuilder::new()
        .with_task("finalize", TaskConfigBuilder::group().after("scripts").build())
        .try_build()
        .unwrap_err();
    assert_eq!(err.to_string(), "Task 'finalize' depends on unknown task 'scripts'");
}

#[test]
fn self_dependency_and_empty_project_are_rejected() {
    let err = ConfigFileBuilder::new()
        .with_task("html", TaskConfigBuilder::group().after("html").build())
        .try_build()
        .unwrap_err();
    assert!(err.to_string().contains("cannot depend on itself"));

    let err = ConfigFileBuilder::new().try_build().unwrap_err();
    assert!(err.is_configuration_error());
}

#[test]
fn zero_debounce_is_rejected() {
    let err = ConfigFileBuilder::new()
        .debounce_ms(0)
        .with_task("html", TaskConfigBuilder::new(&["src/**/*.html"]).build())
        .try_build()
        .unwrap_err();
    assert!(err.to_string().contains("debounce_ms"));
}

#[test]
fn invalid_glob_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_task("html", TaskConfigBuilder::new(&["src/[*.html"]).build())
        .try_build()
        .unwrap_err();
    assert!(err.to_string().contains("invalid glob"));
}

#[test]
fn second_concat_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_task(
            "scripts",
            TaskConfigBuilder::new(&["src/js/**/*.js"])
                .concat("app.js")
                .concat("vendor.js")
                .build(),
        )
        .try_build()
        .unwrap_err();
    assert!(err.to_string().contains("at most one"));
}

#[test]
fn stage_kinds_are_checked_as_each_mode_sees_the_chain() {
    let command = |name: &str, input: &str, output: &str, when: Option<StageCondition>| StageConfig::Command {
        name: Some(name.to_string()),
        cmd: format!("{name} --stdin"),
        input: Some(input.to_string()),
        output: Some(output.to_string()),
        rename_ext: None,
        when,
    };

    // The development-only sass step hands css to a stage expecting scss;
    // without it (production) the chain is fine.
    let err = ConfigFileBuilder::new()
        .with_task(
            "styles",
            TaskConfigBuilder::new(&["src/SCSS/**/*.scss"])
                .stage(command("sass", "scss", "css", Some(StageCondition::Development)))
                .stage(command("stylelint", "scss", "scss", None))
                .build(),
        )
        .try_build()
        .unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("'sass' produces 'css'"), "{msg}");
    assert!(msg.contains("'stylelint' expects 'scss'"), "{msg}");
    assert!(msg.contains("(development mode)"), "{msg}");
}

#[test]
fn conditional_minify_is_valid() {
    let cfg = ConfigFileBuilder::new()
        .with_task(
            "html",
            TaskConfigBuilder::new(&["src/**/*.html"])
                .minify(Some(StageCondition::Production))
                .build(),
        )
        .with_task("finalize", TaskConfigBuilder::group().after("html").build())
        .build();
    assert_eq!(cfg.topological_order(), ["html", "finalize"]);
}

fn with_output_root(output_root: &str) -> Result<ConfigFile, AssetdagError> {
    ConfigFileBuilder::new()
        .output_root(output_root)
        .with_task("html", TaskConfigBuilder::new(&["src/*.html"]).build())
        .try_build()
}

#[test]
fn output_root_must_not_be_the_project_or_above_it() {
    for root in [".", "./", "src/..", "..", "../dist", "dist/../.."] {
        let err = with_output_root(root).unwrap_err();
        assert!(err.is_configuration_error(), "{root}: {err}");
        assert!(err.to_string().contains("output_root"), "{root}: {err}");
    }
}

#[test]
fn absolute_output_root_is_rejected() {
    let abs = std::env::temp_dir().join("assetdag-out");
    let err = with_output_root(abs.to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("relative path inside the project"), "{err}");
}

#[test]
fn output_root_holding_sources_is_rejected() {
    let err = with_output_root("src").unwrap_err();
    assert!(err.to_string().contains("lies inside output_root"), "{err}");

    let err = with_output_root("./src/").unwrap_err();
    assert!(err.to_string().contains("lies inside output_root"), "{err}");

    // Watched paths count too.
    let err = ConfigFileBuilder::new()
        .output_root("assets")
        .with_task(
            "styles",
            TaskConfigBuilder::new(&["src/SCSS/*.scss"])
                .watch("assets/SCSS/**")
                .build(),
        )
        .try_build()
        .unwrap_err();
    assert!(err.to_string().contains("'assets/SCSS/**'"), "{err}");
}

#[test]
fn output_root_beside_sources_is_accepted() {
    assert!(with_output_root("dist").is_ok());
    assert!(with_output_root("build/site").is_ok());
    assert!(with_output_root("src-out").is_ok());
}

#[test]
fn output_root_at_project_root_never_deletes_sources() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    assetdag_test_utils::write_file(root, "src/index.html", "<p>hi</p>");
    assetdag_test_utils::write_file(
        root,
        "Assetdag.toml",
        "[config]\noutput_root = \".\"\n\n[task.html]\nsources = [\"src/*.html\"]\n",
    );

    let err = BuildOrchestrator::from_config_path(&root.join("Assetdag.toml")).unwrap_err();
    assert!(err.is_configuration_error());
    assert!(root.join("src/index.html").exists());
}
