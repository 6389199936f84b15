// tests/integration/build_pipeline.rs

use std::fs;
use std::path::Path;
use std::sync::Arc;

use assetdag::engine::TaskStatus;
use assetdag::errors::AssetdagError;
use assetdag::orchestrator::BuildOrchestrator;
use assetdag::reload::BroadcastNotifier;
use assetdag::types::BuildMode;
use assetdag_test_utils::{init_tracing, with_timeout, write_file};

fn project(root: &Path, toml: &str) -> BuildOrchestrator {
    write_file(root, "Assetdag.toml", toml);
    BuildOrchestrator::from_config_path(&root.join("Assetdag.toml")).unwrap()
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap_or_else(|e| panic!("reading {rel}: {e}"))
}

#[cfg(unix)]
#[tokio::test]
async fn failing_input_is_isolated_and_dependents_are_skipped() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/css/a.css", "a { color: red; }");
    write_file(root, "src/css/b.css", "b { BROKEN }");
    write_file(root, "src/img/logo.svg", "<svg/>");

    let orchestrator = project(
        root,
        r#"
[task.styles]
sources = ["src/css/*.css"]
dest = "css"
stages = [
  { name = "check", kind = "command", cmd = '''input=$(cat); case "$input" in *BROKEN*) echo "bad syntax" >&2; exit 1;; *) printf '%s' "$input";; esac''' },
]

[task.images]
sources = ["src/img/**/*"]
dest = "img"

[task.finalize]
after = ["styles", "images"]
"#,
    );

    let summary = with_timeout(orchestrator.run_once(BuildMode::Development))
        .await
        .unwrap();

    assert!(!summary.is_success());
    assert_eq!(read(root, "dist/css/a.css"), "a { color: red; }");
    assert!(!root.join("dist/css/b.css").exists());
    assert_eq!(read(root, "dist/img/logo.svg"), "<svg/>");

    let styles = summary.result_for("styles").unwrap();
    assert!(matches!(&styles.status, TaskStatus::Failed { reason } if reason == "1 input(s) failed"));
    assert_eq!(styles.artifacts, vec![root.join("dist/css/a.css")]);
    assert_eq!(
        summary.result_for("finalize").unwrap().status,
        TaskStatus::SkippedDueToDependencyFailure {
            failed_dependency: "styles".to_string()
        }
    );

    let lines = summary.failure_lines();
    assert!(
        lines.contains(&"error check src/css/b.css: bad syntax (exit status: 1)".to_string()),
        "{lines:?}"
    );
    assert_eq!(summary.to_string(), "1/3 tasks succeeded, 2 artifacts written");
}

#[tokio::test]
async fn minify_only_runs_in_production() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let page = "<p>  hello   world  </p>\n<!-- note -->\n";
    write_file(root, "src/index.html", page);

    let orchestrator = project(
        root,
        r#"
[task.html]
sources = ["src/*.html"]
stages = [{ kind = "minify", when = "production" }]
"#,
    );

    let dev = orchestrator.run_once(BuildMode::Development).await.unwrap();
    assert!(dev.is_success());
    assert_eq!(read(root, "dist/index.html"), page);

    let prod = orchestrator.run_once(BuildMode::Production).await.unwrap();
    assert!(prod.is_success());
    assert_eq!(read(root, "dist/index.html"), "<p> hello world </p>");
}

#[tokio::test]
async fn concat_bundles_sources_in_path_order() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/js/b.js", "var b;");
    write_file(root, "src/js/a.js", "var a;");
    write_file(root, "src/js/lib/c.js", "var c;");

    let orchestrator = project(
        root,
        r#"
[task.scripts]
sources = ["src/js/**/*.js"]
dest = "js"
stages = [{ kind = "concat", file = "app.js" }]
"#,
    );

    let summary = orchestrator.run_once(BuildMode::Development).await.unwrap();
    assert!(summary.is_success());
    assert_eq!(read(root, "dist/js/app.js"), "var a;\nvar b;\nvar c;");
    assert!(!root.join("dist/js/a.js").exists());
}

#[tokio::test]
async fn concat_follows_declared_source_order() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/js/main.js", "MAIN");
    write_file(root, "src/js/a/lib.js", "LIB");
    write_file(root, "src/js/a/util.js", "UTIL");

    let orchestrator = project(
        root,
        r#"
[task.scripts]
sources = ["src/js/main.js", "src/js/a/*.js", "src/js/**/*.js"]
stages = [{ kind = "concat", file = "app.js" }]
"#,
    );

    let summary = orchestrator.run_once(BuildMode::Development).await.unwrap();
    assert!(summary.is_success());
    // Later patterns that match again do not repeat a file.
    assert_eq!(read(root, "dist/app.js"), "MAIN\nLIB\nUTIL");
}

#[cfg(unix)]
#[tokio::test]
async fn rename_ext_changes_artifact_extension() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/SCSS/main.scss", "$c: red;");

    let orchestrator = project(
        root,
        r#"
[task.styles]
sources = ["src/SCSS/**/*.scss"]
dest = "css"
stages = [
  { name = "sass", kind = "command", cmd = "tr -d '$'", input = "scss", output = "css", rename_ext = "css" },
]
"#,
    );

    let summary = orchestrator.run_once(BuildMode::Development).await.unwrap();
    assert!(summary.is_success());
    assert_eq!(read(root, "dist/css/main.css"), "c: red;");
    assert!(!root.join("dist/css/main.scss").exists());
}

#[tokio::test]
async fn run_once_clears_stale_output() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/robots.txt", "User-agent: *");
    write_file(root, "dist/old/leftover.txt", "stale");

    let orchestrator = project(
        root,
        r#"
[task.resources]
sources = ["src/**/*"]
"#,
    );

    orchestrator.run_once(BuildMode::Production).await.unwrap();
    assert!(!root.join("dist/old").exists());
    assert_eq!(read(root, "dist/robots.txt"), "User-agent: *");
}

#[tokio::test]
async fn uncleanable_output_root_aborts_before_any_task() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/robots.txt", "User-agent: *");
    // A regular file where the output directory should be.
    write_file(root, "public", "not a directory");

    let orchestrator = project(
        root,
        r#"
[config]
output_root = "public"

[task.resources]
sources = ["src/**/*"]
"#,
    );

    let err = orchestrator.run_once(BuildMode::Development).await.unwrap_err();
    assert!(matches!(err, AssetdagError::CleanFailed { .. }), "{err}");
    assert_eq!(read(root, "public"), "not a directory");
}

#[tokio::test]
async fn reload_notifier_sees_written_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/index.html", "<p>hi</p>");

    let notifier = Arc::new(BroadcastNotifier::new(8));
    let mut rx = notifier.subscribe();
    let orchestrator = project(
        root,
        r#"
[task.html]
sources = ["src/*.html"]
"#,
    )
    .with_notifier(notifier);

    orchestrator.run_once(BuildMode::Development).await.unwrap();

    let batch = rx.try_recv().unwrap();
    assert_eq!(*batch, vec![root.join("dist/index.html")]);
}

#[tokio::test]
async fn dry_run_plan_lists_active_stages() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = project(
        dir.path(),
        r#"
[task.scripts]
sources = ["src/js/**/*.js"]
dest = "js"
stages = [
  { kind = "concat", file = "app.js" },
  { kind = "minify", when = "production" },
]

[task.finalize]
after = ["scripts"]
"#,
    );

    let dev = orchestrator.plan(BuildMode::Development);
    let prod = orchestrator.plan(BuildMode::Production);
    assert!(dev.contains("stages: concat(app.js)\n"), "{dev}");
    assert!(prod.contains("stages: concat(app.js) -> minify\n"), "{prod}");
    assert!(prod.contains("(group)"));
    // Planning touches nothing on disk.
    assert!(!dir.path().join("dist").exists());
}

#[test]
fn demo_project_validates() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/frontend/Assetdag.toml");
    let orchestrator = BuildOrchestrator::from_config_path(&path).unwrap();

    let order = orchestrator.config().topological_order();
    assert_eq!(order.last().map(String::as_str), Some("finalize"));
    assert!(orchestrator.pipeline("finalize").is_none());
    assert!(orchestrator.pipeline("styles").unwrap().is_bundling());

    let plan = orchestrator.plan(BuildMode::Production);
    assert!(plan.contains("stages: sass -> concat(main.css) -> autoprefix -> minify"), "{plan}");
    let plan = orchestrator.plan(BuildMode::Development);
    assert!(plan.contains("stages: babel -> concat(app.js)\n"), "{plan}");
    assert!(plan.contains("stages: sass -> concat(main.css) -> autoprefix\n"), "{plan}");
}

#[cfg(unix)]
#[tokio::test]
async fn development_only_stage_is_skipped_in_production() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/js/main.js", "run();");

    let orchestrator = project(
        root,
        r#"
[task.scripts]
sources = ["src/js/*.js"]
stages = [
  { name = "sourcemap", kind = "command", cmd = "cat; printf '\\n//# sourceMappingURL=inline'", input = "js", when = "development" },
]
"#,
    );

    let dev = orchestrator.run_once(BuildMode::Development).await.unwrap();
    assert!(dev.is_success(), "{:?}", dev.failure_lines());
    assert_eq!(read(root, "dist/main.js"), "run();\n//# sourceMappingURL=inline");

    let prod = orchestrator.run_once(BuildMode::Production).await.unwrap();
    assert!(prod.is_success(), "{:?}", prod.failure_lines());
    assert_eq!(read(root, "dist/main.js"), "run();");
    assert!(!orchestrator.plan(BuildMode::Production).contains("sourcemap"));
}
