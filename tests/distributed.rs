//! Distributed strategy against real worker processes
//!
//! Workers are the compiled `tree-runner` binary in `worker` mode, so these
//! tests exercise process spawning, the JSON-lines protocol and crash
//! recovery end to end.

use std::collections::BTreeMap;

use tree_runner::config::RunConfig;
use tree_runner::executor::{Strategy, WorkerCommand};
use tree_runner::models::{AssertionOutcome, Counts, ErrorKind, TestTree};
use tree_runner::plans;
use tree_runner::results::aggregates_consistent;
use tree_runner::scheduler::run;

fn worker_command(plan: &str) -> WorkerCommand {
    WorkerCommand::new(env!("CARGO_BIN_EXE_tree-runner"))
        .arg("worker")
        .arg("--plan")
        .arg(plan)
}

fn distributed(plan: &str, workers: usize) -> RunConfig {
    RunConfig::new(Strategy::Distributed)
        .with_workers(workers)
        .with_worker_command(worker_command(plan))
}

fn per_case(tree: &TestTree) -> BTreeMap<String, Counts> {
    tree.cases().map(|c| (c.full_name(), c.counts())).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distributed_matches_sequential() {
    for plan in ["arithmetic", "bulk", "nested"] {
        let sequential = run(plans::build(plan).unwrap(), &RunConfig::default())
            .await
            .unwrap();

        for workers in [1, 3, 16] {
            let outcome = run(plans::build(plan).unwrap(), &distributed(plan, workers))
                .await
                .unwrap();

            assert_eq!(outcome.totals, sequential.totals, "{plan} with {workers} workers");
            assert_eq!(per_case(&outcome.tree), per_case(&sequential.tree));
            assert!(aggregates_consistent(&outcome.tree.root));
            assert_eq!(outcome.strategy, "distributed");
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_crashed_worker_is_reported_and_replaced() {
    let outcome = run(plans::build("crashy").unwrap(), &distributed("crashy", 1))
        .await
        .unwrap();

    assert_eq!(
        outcome.totals,
        Counts {
            pass: 2,
            fail: 0,
            error: 1,
            broken: 0
        }
    );
    assert!(!outcome.passed);

    let crashed = outcome.tree.find_case("crashy.crashes").unwrap();
    match &crashed.result.as_ref().unwrap().outcomes[..] {
        [AssertionOutcome::Error { kind, message, .. }] => {
            assert_eq!(*kind, ErrorKind::WorkerCrashed);
            assert!(message.contains(&format!("exit code {}", plans::CRASH_EXIT_CODE)));
        }
        other => panic!("expected one process failure, got {other:?}"),
    }

    let after = outcome.tree.find_case("crashy.after").unwrap();
    assert_eq!(after.counts().pass, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_distributed_filter_and_xml() {
    let dir = tempfile::tempdir().unwrap();
    let xml = dir.path().join("junit.xml");
    let config = distributed("nested", 2)
        .with_filter("nested.parser")
        .with_xml_output(&xml);

    let outcome = run(plans::build("nested").unwrap(), &config).await.unwrap();

    assert_eq!(outcome.selected, 3);
    assert_eq!(outcome.totals.error, 0);
    assert!(outcome.passed);
    assert!(outcome
        .tree
        .find_suite("nested.network")
        .unwrap()
        .aggregate
        .is_zero());
    assert!(outcome
        .tree
        .find_case("nested.storage.pages")
        .unwrap()
        .result
        .is_none());

    let report = std::fs::read_to_string(&xml).unwrap();
    assert_eq!(report.matches("<testcase ").count(), 3);
    assert!(report.contains(r#"classname="nested.parser.tokens""#));
    assert!(!report.contains("storage"));
    assert!(!report.contains("network"));
}
