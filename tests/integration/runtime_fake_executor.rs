// tests/integration/runtime_fake_executor.rs

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use assetdag::engine::{BuildSummary, RuntimeEvent, TaskStatus};
use assetdag_test_utils::builders::noop_graph;
use assetdag_test_utils::fake_executor::FakeExecutor;
use assetdag_test_utils::{init_tracing, with_timeout};

#[tokio::test]
async fn runtime_with_fake_executor_runs_simple_chain() {
    init_tracing();

    let graph = noop_graph(&[("A", &[]), ("B", &["A"])]);
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx, Arc::clone(&executed));

    let results = with_timeout(graph.run_with_executor(&[], CancellationToken::new(), rt_rx, executor))
        .await
        .unwrap();

    assert_eq!(*executed.lock().unwrap(), ["A", "B"]);
    assert_eq!(results.len(), 2);
    assert!(BuildSummary::new(results).is_success());
}

#[tokio::test]
async fn fake_failure_skips_transitive_dependents() {
    init_tracing();

    let graph = noop_graph(&[
        ("clean", &[]),
        ("scripts", &["clean"]),
        ("bundle", &["scripts"]),
        ("finalize", &["bundle"]),
        ("images", &["clean"]),
    ]);
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx, Arc::clone(&executed)).failing("scripts");

    let results = with_timeout(graph.run_with_executor(&[], CancellationToken::new(), rt_rx, executor))
        .await
        .unwrap();
    let summary = BuildSummary::new(results);

    let mut executed = executed.lock().unwrap().clone();
    executed.sort();
    assert_eq!(executed, ["clean", "images", "scripts"]);

    for task in ["bundle", "finalize"] {
        assert_eq!(
            summary.result_for(task).unwrap().status,
            TaskStatus::SkippedDueToDependencyFailure {
                failed_dependency: "scripts".to_string()
            },
            "{task}"
        );
    }
    assert!(summary.result_for("images").unwrap().is_success());
    assert!(summary
        .failure_lines()
        .contains(&"FAILED scripts: fake failure".to_string()));
}
