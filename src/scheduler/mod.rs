//! Run orchestration
//!
//! The scheduler owns the three phases of a run: the build pass, which runs
//! suite bodies inline and flattens cases into the pending list; selection,
//! which prunes that list; and execution, which hands the list to a strategy
//! and folds the recorded outcomes back into the tree.

mod filter;

pub use filter::CaseFilter;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::error::{EngineError, Result};
use crate::executor::{
    AbortSignal, DistributedExecutor, Executor, ParallelExecutor, SequentialExecutor,
    ShuffledExecutor, Strategy,
};
use crate::models::{Counts, SuiteBuilder, TestTree};
use crate::output::junit;
use crate::results::{aggregates_consistent, OutcomeRecorder};
use crate::utils::timer::Stopwatch;

/// Finalized result of one run
#[derive(Debug, Serialize)]
pub struct RunOutcome {
    pub tree: TestTree,
    pub totals: Counts,
    /// False when any assertion failed or errored, or the XML report could
    /// not be written
    pub passed: bool,
    pub strategy: String,
    pub seed: Option<u64>,
    pub workers: usize,
    /// Cases handed to the strategy after filtering
    pub selected: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub xml_path: Option<PathBuf>,
    pub xml_error: Option<String>,
}

pub struct Scheduler {
    config: RunConfig,
}

impl Scheduler {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run the build pass for a root suite
    pub fn build<F>(name: &str, body: F) -> TestTree
    where
        F: FnOnce(&mut SuiteBuilder<'_>) -> anyhow::Result<()>,
    {
        TestTree::build(name, body)
    }

    /// Keep only the pending cases whose dotted path matches `filter`.
    /// Build errors outside the filter are pruned too. Returns the number
    /// of cases kept.
    pub fn select(tree: &mut TestTree, filter: &CaseFilter) -> usize {
        let pending = tree.pending_mut();
        let before = pending.len();
        pending.retain(|case| filter.matches(&case.full_name()));
        let kept = pending.len();

        let pruned = tree.prune_build_errors(|path| filter.matches(path));
        if pruned > 0 {
            debug!("Filter '{}' pruned {} build errors", filter.as_str(), pruned);
        }

        info!(
            "Filter '{}' selected {} of {} cases",
            filter.as_str(),
            kept,
            before
        );
        kept
    }

    /// Executor for the configured strategy
    pub fn executor(&self) -> Result<Box<dyn Executor>> {
        let workers = self.config.workers();
        let executor: Box<dyn Executor> = match self.config.strategy {
            Strategy::Sequential => Box::new(SequentialExecutor),
            Strategy::Shuffled => Box::new(ShuffledExecutor::new(self.config.seed)),
            Strategy::Parallel => Box::new(ParallelExecutor::new(workers)),
            Strategy::Distributed => {
                let command = self
                    .config
                    .worker_command
                    .clone()
                    .ok_or(EngineError::MissingWorkerCommand)?;
                Box::new(DistributedExecutor::new(workers, command))
            }
        };
        Ok(executor)
    }

    /// Abort signal carrying the configured run timeout
    pub fn abort_signal(&self) -> AbortSignal {
        match self.config.timeout() {
            Some(timeout) => AbortSignal::with_timeout(timeout),
            None => AbortSignal::new(),
        }
    }

    pub async fn run(&self, tree: TestTree) -> Result<RunOutcome> {
        self.run_until(tree, self.abort_signal()).await
    }

    /// Run with an externally controlled abort signal
    pub async fn run_until(&self, tree: TestTree, abort: AbortSignal) -> Result<RunOutcome> {
        let executor = self.executor()?;
        self.run_with(tree, executor.as_ref(), abort).await
    }

    /// Filter, execute, finalize and report `tree` using `executor`
    pub async fn run_with(
        &self,
        mut tree: TestTree,
        executor: &dyn Executor,
        abort: AbortSignal,
    ) -> Result<RunOutcome> {
        if let Some(filter) = self.config.case_filter()? {
            Self::select(&mut tree, &filter);
        }

        let started_at = Utc::now();
        let mut stopwatch = Stopwatch::start();

        let pending = tree.take_pending();
        let selected = pending.len();
        info!(
            "Running {} cases of '{}' with {} strategy",
            selected,
            tree.root.name,
            executor.name()
        );

        let recorder = Arc::new(OutcomeRecorder::for_tree(&tree));
        executor.execute(pending, recorder.clone(), abort).await?;
        stopwatch.lap("execute");

        let recorded = recorder.recorded_count();
        if recorded != selected {
            warn!("{} cases selected but {} recorded", selected, recorded);
        }

        let recorder = Arc::try_unwrap(recorder).map_err(|_| EngineError::RecorderInUse)?;
        let totals = recorder.finalize(&mut tree);
        debug_assert!(aggregates_consistent(&tree.root));
        stopwatch.lap("finalize");

        let xml_path = self.config.xml_output_path.clone();
        let xml_error = match &xml_path {
            Some(path) => match junit::write_report(path, &tree, started_at) {
                Ok(()) => {
                    info!("JUnit report written to {}", path.display());
                    None
                }
                Err(e) => {
                    let message = format!("{:#}", anyhow::Error::new(e));
                    error!("{}", message);
                    Some(message)
                }
            },
            None => None,
        };
        stopwatch.lap("report");

        debug!("Run phases: {}", stopwatch);

        let passed = totals.is_success() && xml_error.is_none();
        let duration_ms = stopwatch.total().as_millis() as u64;
        info!(
            "Run finished in {}ms: {} ({})",
            duration_ms,
            totals,
            if passed { "passed" } else { "failed" }
        );

        Ok(RunOutcome {
            tree,
            totals,
            passed,
            strategy: executor.name().to_string(),
            seed: executor.seed(),
            workers: executor.concurrency(),
            selected,
            started_at,
            duration_ms,
            xml_path,
            xml_error,
        })
    }
}

/// Run `tree` under `config`
pub async fn run(tree: TestTree, config: &RunConfig) -> Result<RunOutcome> {
    Scheduler::new(config.clone()).run(tree).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssertionOutcome, CaseId, ErrorKind};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mixed outcomes across nested suites, including a build error
    fn fixture() -> TestTree {
        Scheduler::build("root", |root| {
            root.suite("math", |s| {
                s.case("adds", |t| {
                    t.check_eq("1 + 1 == 2", 1 + 1, 2);
                    t.check_eq("2 + 2 == 4", 2 + 2, 4);
                    t.check_eq("3 + 3 == 6", 3 + 3, 6);
                    Ok(())
                });
                s.case("muls", |t| {
                    t.check_eq("2 * 3 == 6", 2 * 3, 6);
                    t.check_eq("2 * 2 == 5", 2 * 2, 5);
                    Ok(())
                });
                Ok(())
            });
            root.suite("io", |s| {
                s.case("throws", |t| {
                    t.check("opened", true);
                    anyhow::bail!("connection reset");
                });
                s.case("panics", |_| panic!("index out of bounds"));
                s.case("sections", |t| {
                    t.section("header", |t| {
                        t.check("magic", true);
                        Ok(())
                    })?;
                    t.section("payload", |t| {
                        t.broken("checksum", "not implemented");
                        Ok(())
                    })
                });
                Ok(())
            });
            root.suite("fixtures", |s| {
                s.case("before", |t| {
                    t.check("ok", true);
                    Ok(())
                });
                anyhow::bail!("fixture directory missing");
            });
            Ok(())
        })
    }

    fn per_case(tree: &TestTree) -> BTreeMap<String, Counts> {
        tree.cases().map(|c| (c.full_name(), c.counts())).collect()
    }

    fn counting_tree(cases: usize, calls: Arc<Vec<AtomicUsize>>) -> TestTree {
        Scheduler::build("root", move |s| {
            for i in 0..cases {
                let calls = calls.clone();
                s.case(&format!("case_{i}"), move |t| {
                    calls[i].fetch_add(1, Ordering::SeqCst);
                    t.check("runs", true);
                    Ok(())
                });
            }
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_scenario_pass_fail_error() {
        let tree = Scheduler::build("root", |s| {
            s.case("three_passes", |t| {
                t.check("a", true);
                t.check("b", true);
                t.check("c", true);
                Ok(())
            });
            s.case("mixed", |t| {
                t.check("1 < 2", 1 < 2);
                t.check_eq("2 * 2 == 5", 2 * 2, 5);
                anyhow::bail!("unexpected end of input");
            });
            Ok(())
        });

        let outcome = run(tree, &RunConfig::default()).await.unwrap();
        assert_eq!(
            outcome.totals,
            Counts {
                pass: 4,
                fail: 1,
                error: 1,
                broken: 0
            }
        );
        assert!(!outcome.passed);
        assert_eq!(outcome.selected, 2);
        assert_eq!(outcome.strategy, "sequential");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_totals_are_order_independent() {
        let baseline = run(fixture(), &RunConfig::default()).await.unwrap();
        let expected_cases = per_case(&baseline.tree);
        assert_eq!(
            baseline.totals,
            Counts {
                pass: 7,
                fail: 1,
                error: 3,
                broken: 1
            }
        );

        let configs = [
            RunConfig::new(Strategy::Shuffled).with_seed(1),
            RunConfig::new(Strategy::Shuffled).with_seed(99),
            RunConfig::new(Strategy::Shuffled),
            RunConfig::new(Strategy::Parallel).with_workers(1),
            RunConfig::new(Strategy::Parallel).with_workers(3),
            RunConfig::new(Strategy::Parallel).with_workers(32),
        ];
        for config in configs {
            let outcome = run(fixture(), &config).await.unwrap();
            assert_eq!(outcome.totals, baseline.totals, "{}", config.strategy);
            assert_eq!(per_case(&outcome.tree), expected_cases);
            assert!(aggregates_consistent(&outcome.tree.root));
        }
    }

    #[tokio::test]
    async fn test_build_error_fails_run_and_keeps_siblings() {
        let outcome = run(fixture(), &RunConfig::default()).await.unwrap();
        let tree = &outcome.tree;

        let suite = tree.find_suite("root.fixtures").unwrap();
        assert!(suite.build_error.as_deref().unwrap().contains("fixture directory missing"));
        assert_eq!(suite.aggregate.pass, 1);
        assert_eq!(suite.aggregate.error, 1);
        assert!(tree.find_case("root.fixtures.<build>").unwrap().is_build_error());

        assert_eq!(tree.find_suite("root.math").unwrap().aggregate.pass, 4);
        assert!(!outcome.passed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_each_body_runs_exactly_once() {
        for config in [
            RunConfig::new(Strategy::Sequential),
            RunConfig::new(Strategy::Shuffled).with_seed(5),
            RunConfig::new(Strategy::Parallel).with_workers(16),
        ] {
            let calls: Arc<Vec<AtomicUsize>> = Arc::new((0..5).map(|_| AtomicUsize::new(0)).collect());
            let outcome = run(counting_tree(5, calls.clone()), &config).await.unwrap();

            assert!(calls.iter().all(|c| c.load(Ordering::SeqCst) == 1));
            assert_eq!(outcome.totals.pass, 5);
            assert!(outcome.passed);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failing_case_does_not_affect_siblings() {
        let config = RunConfig::new(Strategy::Parallel).with_workers(2);
        let tree = Scheduler::build("root", |s| {
            s.suite("left", |s| {
                s.case("panics", |t| {
                    t.check("before", true);
                    panic!("boom");
                });
                Ok(())
            });
            s.suite("right", |s| {
                s.case("steady", |t| {
                    t.check("first", true);
                    t.check("second", true);
                    Ok(())
                });
                Ok(())
            });
            Ok(())
        });

        let outcome = run(tree, &config).await.unwrap();
        let steady = outcome.tree.find_case("root.right.steady").unwrap();
        assert_eq!(
            steady.result.as_ref().unwrap().outcomes,
            vec![AssertionOutcome::Pass, AssertionOutcome::Pass]
        );
        let panics = outcome.tree.find_case("root.left.panics").unwrap();
        assert_eq!(panics.counts().error, 1);
    }

    #[tokio::test]
    async fn test_filter_prunes_to_subtree() {
        let tree = || {
            Scheduler::build("root", |root| {
                root.suite("math", |s| {
                    s.case("adds", |t| {
                        t.check("a", true);
                        Ok(())
                    });
                    s.case("muls", |t| {
                        t.check_eq("2 * 2 == 5", 2 * 2, 5);
                        Ok(())
                    });
                    Ok(())
                });
                root.suite("mathematics", |s| {
                    s.case("proofs", |t| {
                        t.check("qed", true);
                        Ok(())
                    });
                    Ok(())
                });
                root.case("standalone", |t| {
                    t.check("x", true);
                    Ok(())
                });
                Ok(())
            })
        };

        let full = run(tree(), &RunConfig::default()).await.unwrap();
        let filtered = run(tree(), &RunConfig::default().with_filter("root.math"))
            .await
            .unwrap();

        assert_eq!(filtered.selected, 2);
        assert_eq!(
            filtered.tree.find_suite("root.math").unwrap().aggregate,
            full.tree.find_suite("root.math").unwrap().aggregate
        );
        for name in ["root.mathematics.proofs", "root.standalone"] {
            let case = filtered.tree.find_case(name).unwrap();
            assert!(case.result.is_none());
            assert!(case.counts().is_zero());
        }
        assert!(filtered.tree.find_suite("root.mathematics").unwrap().aggregate.is_zero());
        assert_eq!(filtered.totals, full.tree.find_suite("root.math").unwrap().aggregate);
    }

    #[tokio::test]
    async fn test_build_errors_outside_filter_are_pruned() {
        let outcome = run(fixture(), &RunConfig::default().with_filter("root.math"))
            .await
            .unwrap();

        let fixtures = outcome.tree.find_suite("root.fixtures").unwrap();
        assert!(fixtures.aggregate.is_zero());
        assert!(outcome
            .tree
            .find_case("root.fixtures.<build>")
            .unwrap()
            .result
            .is_none());
        assert_eq!(
            outcome.totals,
            Counts {
                pass: 4,
                fail: 1,
                ..Counts::default()
            }
        );
        assert!(aggregates_consistent(&outcome.tree.root));

        let inside = run(fixture(), &RunConfig::default().with_filter("root.fixtures"))
            .await
            .unwrap();
        assert_eq!(inside.selected, 1);
        assert_eq!(inside.totals.error, 1);
        assert!(!inside.passed);
    }

    #[test]
    fn test_select_with_glob() {
        let mut tree = fixture();
        let kept = Scheduler::select(&mut tree, &CaseFilter::parse("*.io.*").unwrap());
        assert_eq!(kept, 3);
        assert!(tree.pending().iter().all(|c| c.path[1] == "io"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_bulk_is_stable() {
        let config = RunConfig::new(Strategy::Parallel).with_workers(4);
        for _ in 0..100 {
            let tree = Scheduler::build("bulk", |s| {
                for i in 0..12 {
                    s.case(&format!("case_{i}"), move |t| {
                        for n in 0..(i % 4 + 1) {
                            t.check_eq("n == n", n, n);
                        }
                        Ok(())
                    });
                }
                Ok(())
            });

            let outcome = run(tree, &config).await.unwrap();
            assert_eq!(
                outcome.totals,
                Counts {
                    pass: 30,
                    ..Counts::default()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_aborted_run_reports_every_case() {
        let scheduler = Scheduler::new(RunConfig::new(Strategy::Parallel).with_workers(2));
        let abort = AbortSignal::new();
        abort.abort();

        let outcome = scheduler.run_until(fixture(), abort).await.unwrap();
        let aborted = outcome
            .tree
            .cases()
            .filter(|c| !c.is_build_error())
            .filter(|c| {
                matches!(
                    c.result.as_ref().unwrap().outcomes[..],
                    [AssertionOutcome::Error {
                        kind: ErrorKind::Aborted,
                        ..
                    }]
                )
            })
            .count();
        assert_eq!(aborted, outcome.selected);
        assert!(!outcome.passed);
    }

    #[test]
    fn test_distributed_requires_worker_command() {
        let scheduler = Scheduler::new(RunConfig::new(Strategy::Distributed));
        assert!(matches!(
            scheduler.executor(),
            Err(EngineError::MissingWorkerCommand)
        ));
    }

    #[test]
    fn test_run_metadata() {
        let config = RunConfig::new(Strategy::Shuffled).with_seed(7);
        let calls = Arc::new(vec![AtomicUsize::new(0), AtomicUsize::new(0)]);
        let outcome = tokio_test::block_on(run(counting_tree(2, calls), &config)).unwrap();

        assert_eq!(outcome.strategy, "shuffled");
        assert_eq!(outcome.seed, Some(7));
        assert_eq!(outcome.workers, 1);
        assert!(outcome.xml_path.is_none());
        assert_eq!(outcome.tree.find_case("root.case_1").unwrap().id, CaseId(1));
    }

    #[tokio::test]
    async fn test_xml_report_written_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junit.xml");
        let config = RunConfig::default().with_xml_output(&path);

        let outcome = run(fixture(), &config).await.unwrap();
        assert!(outcome.xml_error.is_none());
        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(xml.contains("<testsuites"));
        assert!(xml.contains("classname=\"root.math\""));
    }

    #[tokio::test]
    async fn test_xml_write_failure_still_reports() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::default().with_xml_output(dir.path());
        let calls = Arc::new(vec![AtomicUsize::new(0)]);

        let outcome = run(counting_tree(1, calls), &config).await.unwrap();
        assert!(outcome.totals.is_success());
        assert!(outcome.xml_error.is_some());
        assert!(!outcome.passed);
    }
}
