// tests/integration/watch_rebuild.rs

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use assetdag::orchestrator::BuildOrchestrator;
use assetdag::types::BuildMode;
use assetdag::watch::{spawn_watcher, BindingState, WatchController};
use assetdag_test_utils::{init_tracing, with_timeout, write_file};

const DEBOUNCE: Duration = Duration::from_millis(30);

fn project(root: &Path, toml: &str) -> BuildOrchestrator {
    write_file(root, "Assetdag.toml", toml);
    BuildOrchestrator::from_config_path(&root.join("Assetdag.toml")).unwrap()
}

fn read(root: &Path, rel: &str) -> Option<String> {
    fs::read_to_string(root.join(rel)).ok()
}

async fn wait_for_runs(ctl: &WatchController, binding: &str, runs: u64) {
    with_timeout(async {
        loop {
            if ctl.run_count(binding) == Some(runs) && ctl.state_of(binding) == Some(BindingState::Idle) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

async fn start(orchestrator: &BuildOrchestrator, cancel: &CancellationToken) -> WatchController {
    orchestrator.run_once(BuildMode::Development).await.unwrap();
    let bindings = orchestrator.watch_bindings(BuildMode::Development).unwrap();
    WatchController::start(orchestrator.project_root(), bindings, DEBOUNCE, cancel.clone())
}

const STYLES: &str = r#"
[task.styles]
sources = ["src/SCSS/[!_]*.scss"]
watch = ["src/SCSS/**"]
dest = "css"
"#;

#[tokio::test]
async fn changed_source_is_rebuilt_incrementally() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/SCSS/main.scss", "v1");
    write_file(root, "src/SCSS/print.scss", "p1");
    let orchestrator = project(root, STYLES);
    let cancel = CancellationToken::new();
    let ctl = start(&orchestrator, &cancel).await;

    write_file(root, "src/SCSS/main.scss", "v2");
    // A stale copy that an incremental run must leave alone.
    write_file(root, "dist/css/print.scss", "untouched");
    assert_eq!(ctl.dispatch("src/SCSS/main.scss"), 1);
    wait_for_runs(&ctl, "styles", 1).await;

    assert_eq!(read(root, "dist/css/main.scss").as_deref(), Some("v2"));
    assert_eq!(read(root, "dist/css/print.scss").as_deref(), Some("untouched"));
    ctl.shutdown().await;
}

#[tokio::test]
async fn unchanged_content_does_not_rebuild_twice() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/SCSS/main.scss", "v1");
    let orchestrator = project(root, STYLES);
    let cancel = CancellationToken::new();
    let ctl = start(&orchestrator, &cancel).await;

    write_file(root, "src/SCSS/main.scss", "v2");
    ctl.dispatch("src/SCSS/main.scss");
    wait_for_runs(&ctl, "styles", 1).await;

    // Saved again without changes.
    write_file(root, "src/SCSS/main.scss", "v2");
    ctl.dispatch("src/SCSS/main.scss");
    tokio::time::sleep(DEBOUNCE * 5).await;
    wait_for_runs(&ctl, "styles", 1).await;

    ctl.shutdown().await;
}

#[tokio::test]
async fn partial_change_rebuilds_whole_pipeline() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/SCSS/main.scss", "v1");
    write_file(root, "src/SCSS/_vars.scss", "a");
    let orchestrator = project(root, STYLES);
    let cancel = CancellationToken::new();
    let ctl = start(&orchestrator, &cancel).await;
    assert_eq!(read(root, "dist/css/_vars.scss"), None);

    // Output of main.scss is modified behind the tool's back; only a full
    // run rewrites it.
    write_file(root, "dist/css/main.scss", "stale");
    write_file(root, "src/SCSS/_vars.scss", "b");
    assert_eq!(ctl.dispatch("src/SCSS/_vars.scss"), 1);
    wait_for_runs(&ctl, "styles", 1).await;

    assert_eq!(read(root, "dist/css/main.scss").as_deref(), Some("v1"));
    assert_eq!(read(root, "dist/css/_vars.scss"), None);
    ctl.shutdown().await;
}

#[tokio::test]
async fn deleted_source_removes_its_artifact() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/SCSS/main.scss", "v1");
    write_file(root, "src/SCSS/old.scss", "old");
    let orchestrator = project(root, STYLES);
    let cancel = CancellationToken::new();
    let ctl = start(&orchestrator, &cancel).await;
    assert_eq!(read(root, "dist/css/old.scss").as_deref(), Some("old"));

    fs::remove_file(root.join("src/SCSS/old.scss")).unwrap();
    ctl.dispatch("src/SCSS/old.scss");
    wait_for_runs(&ctl, "styles", 1).await;

    assert_eq!(read(root, "dist/css/old.scss"), None);
    assert_eq!(read(root, "dist/css/main.scss").as_deref(), Some("v1"));
    ctl.shutdown().await;
}

#[tokio::test]
async fn disabled_watch_creates_no_binding() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = project(
        dir.path(),
        r#"
[task.images]
sources = ["src/img/**/*"]
watch = []

[task.html]
sources = ["src/*.html"]
"#,
    );

    let bindings = orchestrator.watch_bindings(BuildMode::Development).unwrap();
    let names: Vec<&str> = bindings.iter().map(|b| b.name()).collect();
    assert_eq!(names, ["html"]);
}

#[tokio::test]
async fn filesystem_events_reach_bindings_and_output_is_ignored() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/index.html", "<p>v1</p>");
    let orchestrator = project(
        root,
        r#"
[task.html]
sources = ["src/*.html"]
"#,
    );
    let cancel = CancellationToken::new();
    let ctl = Arc::new(start(&orchestrator, &cancel).await);
    let watcher = spawn_watcher(root, "dist", Arc::clone(&ctl), cancel.clone()).unwrap();
    // Let the watcher settle before producing events.
    tokio::time::sleep(Duration::from_millis(100)).await;

    write_file(root, "src/index.html", "<p>v2</p>");
    with_timeout(async {
        while read(root, "dist/index.html").as_deref() != Some("<p>v2</p>") {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    // The rebuild's own write under dist/ must not start another run.
    tokio::time::sleep(DEBOUNCE * 10).await;
    let runs = ctl.run_count("html").unwrap();
    assert!(runs >= 1);
    tokio::time::sleep(DEBOUNCE * 10).await;
    assert_eq!(ctl.run_count("html"), Some(runs));

    cancel.cancel();
    watcher.stop().await;
    let ctl = Arc::try_unwrap(ctl).unwrap();
    ctl.join().await;
}

#[tokio::test]
async fn cancelled_controller_ignores_changes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/SCSS/main.scss", "v1");
    let orchestrator = project(root, STYLES);
    let cancel = CancellationToken::new();
    let ctl = start(&orchestrator, &cancel).await;

    cancel.cancel();
    assert_eq!(ctl.dispatch("src/SCSS/main.scss"), 0);
    with_timeout(ctl.join()).await;
}

#[cfg(unix)]
#[tokio::test]
async fn stop_during_initial_build_starts_nothing_new() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/one/a.txt", "a");
    write_file(root, "src/two/b.txt", "b");
    let orchestrator = project(
        root,
        r#"
[task.one]
sources = ["src/one/*.txt"]
stages = [{ kind = "command", name = "slow", cmd = "sleep 0.5; cat" }]

[task.two]
sources = ["src/two/*.txt"]
after = ["one"]
stages = [{ kind = "command", name = "slow", cmd = "sleep 0.5; cat" }]
"#,
    );

    let cancel = CancellationToken::new();
    let stopper = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel.cancel();
        })
    };

    let summary = with_timeout(orchestrator.run_watch(cancel)).await.unwrap();
    stopper.await.unwrap();

    assert!(summary.result_for("one").unwrap().is_success());
    assert_eq!(
        summary.result_for("two").unwrap().status,
        assetdag::engine::TaskStatus::Cancelled
    );
    assert_eq!(read(root, "dist/a.txt").as_deref(), Some("a"));
    assert!(!root.join("dist/b.txt").exists());
}
