// tests/integration/graph_run.rs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;

use assetdag::dag::{ActionFuture, ActionReport, TaskAction, TaskGraph};
use assetdag::engine::{BuildSummary, TaskStatus};
use assetdag::errors::AssetdagError;
use assetdag_test_utils::{init_tracing, with_timeout};

type Log = Arc<Mutex<Vec<String>>>;

/// Records its name on start; fails if `fail` is set.
fn recording(log: &Log, name: &str, fail: bool) -> TaskAction {
    let log = Arc::clone(log);
    let name = name.to_string();
    Arc::new(move || -> ActionFuture {
        let log = Arc::clone(&log);
        let name = name.clone();
        Box::pin(async move {
            log.lock().unwrap().push(name.clone());
            tokio::time::sleep(Duration::from_millis(10)).await;
            if fail {
                Err(anyhow!("{name} exploded"))
            } else {
                Ok(ActionReport::default())
            }
        })
    })
}

fn position(log: &[String], name: &str) -> usize {
    log.iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("{name} never started: {log:?}"))
}

/// clean -> {html, styles} -> finalize
fn diamond(log: &Log, failing: &[&str]) -> TaskGraph {
    let mut graph = TaskGraph::new();
    let fails = |n: &str| failing.contains(&n);
    graph
        .add_task("clean", Vec::<String>::new(), recording(log, "clean", fails("clean")))
        .unwrap();
    graph
        .add_task("html", ["clean"], recording(log, "html", fails("html")))
        .unwrap();
    graph
        .add_task("styles", ["clean"], recording(log, "styles", fails("styles")))
        .unwrap();
    graph
        .add_task("finalize", ["html", "styles"], recording(log, "finalize", fails("finalize")))
        .unwrap();
    graph
}

#[tokio::test]
async fn diamond_runs_every_task_once_in_dependency_order() {
    init_tracing();
    let log: Log = Arc::default();
    let graph = diamond(&log, &[]);

    let results = with_timeout(graph.run(&[], CancellationToken::new()))
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.is_success()));

    let log = log.lock().unwrap().clone();
    assert_eq!(log.len(), 4);
    assert_eq!(log[0], "clean");
    assert_eq!(log[3], "finalize");
    assert!(position(&log, "html") < position(&log, "finalize"));
    assert!(position(&log, "styles") < position(&log, "finalize"));
}

#[tokio::test]
async fn failure_skips_dependents_but_not_independent_branches() {
    init_tracing();
    let log: Log = Arc::default();
    let graph = diamond(&log, &["styles"]);

    let results = with_timeout(graph.run(&[], CancellationToken::new()))
        .await
        .unwrap();
    let summary = BuildSummary::new(results);

    assert!(!summary.is_success());
    assert!(summary.result_for("html").unwrap().is_success());
    assert!(matches!(
        &summary.result_for("styles").unwrap().status,
        TaskStatus::Failed { reason } if reason.contains("styles exploded")
    ));
    assert_eq!(
        summary.result_for("finalize").unwrap().status,
        TaskStatus::SkippedDueToDependencyFailure {
            failed_dependency: "styles".to_string()
        }
    );

    let log = log.lock().unwrap().clone();
    assert!(!log.contains(&"finalize".to_string()));
    assert!(summary
        .failure_lines()
        .contains(&"SKIPPED finalize (dependency styles failed)".to_string()));
}

#[tokio::test]
async fn starting_task_pulls_in_only_its_dependencies() {
    init_tracing();
    let log: Log = Arc::default();
    let graph = diamond(&log, &[]);

    let results = with_timeout(graph.run(&["html".to_string()], CancellationToken::new()))
        .await
        .unwrap();

    let mut ran: Vec<String> = results.iter().map(|r| r.task.clone()).collect();
    ran.sort();
    assert_eq!(ran, ["clean", "html"]);
    assert_eq!(*log.lock().unwrap(), ["clean", "html"]);
}

#[tokio::test]
async fn unknown_starting_task_runs_nothing() {
    let log: Log = Arc::default();
    let graph = diamond(&log, &[]);

    let err = graph
        .run(&["scripts".to_string()], CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_configuration_error());
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_before_start_runs_nothing() {
    let log: Log = Arc::default();
    let graph = diamond(&log, &[]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let results = with_timeout(graph.run(&[], cancel)).await.unwrap();

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.status == TaskStatus::Cancelled));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancel_during_run_lets_running_task_finish() {
    init_tracing();
    let log: Log = Arc::default();
    let started = Arc::new(tokio::sync::Notify::new());

    let slow: TaskAction = {
        let log = Arc::clone(&log);
        let started = Arc::clone(&started);
        Arc::new(move || -> ActionFuture {
            let log = Arc::clone(&log);
            let started = Arc::clone(&started);
            Box::pin(async move {
                started.notify_one();
                tokio::time::sleep(Duration::from_millis(100)).await;
                log.lock().unwrap().push("clean done".to_string());
                Ok(ActionReport::default())
            })
        })
    };

    let mut graph = TaskGraph::new();
    graph.add_task("clean", Vec::<String>::new(), slow).unwrap();
    graph
        .add_task("html", ["clean"], recording(&log, "html", false))
        .unwrap();

    let cancel = CancellationToken::new();
    let run = {
        let cancel = cancel.clone();
        async move { graph.run(&[], cancel).await }
    };
    let trigger = async {
        started.notified().await;
        cancel.cancel();
    };

    let (results, ()) = with_timeout(async { tokio::join!(run, trigger) }).await;
    let summary = BuildSummary::new(results.unwrap());

    assert!(summary.result_for("clean").unwrap().is_success());
    assert_eq!(summary.result_for("html").unwrap().status, TaskStatus::Cancelled);
    assert_eq!(*log.lock().unwrap(), ["clean done"]);
}

#[tokio::test]
async fn output_write_failure_stops_the_rest_of_the_run() {
    init_tracing();
    let log: Log = Arc::default();

    let broken: TaskAction = Arc::new(|| -> ActionFuture {
        Box::pin(async {
            Err(AssetdagError::OutputWrite {
                path: "dist/a.txt/b.txt".into(),
                source: std::io::Error::other("not a directory"),
            }
            .into())
        })
    });
    let slow: TaskAction = {
        let log = Arc::clone(&log);
        Arc::new(move || -> ActionFuture {
            let log = Arc::clone(&log);
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                log.lock().unwrap().push("slow done".to_string());
                Ok(ActionReport::default())
            })
        })
    };

    let mut graph = TaskGraph::new();
    graph.add_task("bad", Vec::<String>::new(), broken).unwrap();
    graph
        .add_task("bad_dependent", ["bad"], recording(&log, "bad_dependent", false))
        .unwrap();
    graph.add_task("slow", Vec::<String>::new(), slow).unwrap();
    graph
        .add_task("after_slow", ["slow"], recording(&log, "after_slow", false))
        .unwrap();

    let results = with_timeout(graph.run(&[], CancellationToken::new()))
        .await
        .unwrap();
    let summary = BuildSummary::new(results);

    assert!(matches!(
        summary.result_for("bad").unwrap().status,
        TaskStatus::Failed { ref reason } if reason.contains("not a directory")
    ));
    assert_eq!(
        summary.result_for("bad_dependent").unwrap().status,
        TaskStatus::SkippedDueToDependencyFailure {
            failed_dependency: "bad".into()
        }
    );
    // Already running when the write failed, so it finishes.
    assert!(summary.result_for("slow").unwrap().is_success());
    assert_eq!(summary.result_for("after_slow").unwrap().status, TaskStatus::Cancelled);
    assert_eq!(*log.lock().unwrap(), ["slow done"]);
}
