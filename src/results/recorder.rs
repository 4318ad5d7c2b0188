//! Outcome recorder
//!
//! The only shared mutation point of a run. Every case owns one write-once
//! slot, so concurrent writers for distinct cases never contend and a second
//! write for the same case is rejected. `finalize` consumes the recorder,
//! moves results into the tree and sums suite aggregates bottom-up.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use tracing::{debug, error};

use crate::error::{EngineError, Result};
use crate::models::{CaseId, CaseReport, CaseResult, Counts, Suite, TestNode, TestTree};

pub struct OutcomeRecorder {
    slots: Vec<OnceLock<CaseReport>>,
    /// Dotted path of every case, indexed by id
    paths: Vec<String>,
    recorded: AtomicUsize,
}

impl OutcomeRecorder {
    /// Create one empty slot per case in `tree`
    pub fn for_tree(tree: &TestTree) -> Self {
        let mut paths = vec![String::new(); tree.case_count()];
        for case in tree.cases() {
            if let Some(slot) = paths.get_mut(case.id.0) {
                *slot = case.full_name();
            }
        }

        Self {
            slots: (0..tree.case_count()).map(|_| OnceLock::new()).collect(),
            paths,
            recorded: AtomicUsize::new(0),
        }
    }

    /// Store the outcomes of one case. Fails on unknown ids, on batches whose
    /// path disagrees with the tree and on a second write for the same case.
    pub fn record(&self, report: CaseReport) -> Result<()> {
        let case = report.case;
        let expected = self
            .paths
            .get(case.0)
            .ok_or(EngineError::UnknownCase(case))?;

        if *expected != report.path {
            return Err(EngineError::PathMismatch {
                case,
                expected: expected.clone(),
                got: report.path,
            });
        }

        self.slots[case.0].set(report).map_err(|rejected| {
            error!("Duplicate outcome batch for {} ({})", case, rejected.path);
            EngineError::DuplicateRecord {
                case,
                path: rejected.path,
            }
        })?;

        self.recorded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_recorded(&self, case: CaseId) -> bool {
        self.slots.get(case.0).is_some_and(|s| s.get().is_some())
    }

    pub fn recorded_count(&self) -> usize {
        self.recorded.load(Ordering::Relaxed)
    }

    /// Move recorded results into the tree and compute every suite
    /// aggregate. Returns the root totals.
    pub fn finalize(self, tree: &mut TestTree) -> Counts {
        let recorded = self.recorded_count();
        let mut reports: Vec<Option<CaseReport>> =
            self.slots.into_iter().map(OnceLock::into_inner).collect();

        let totals = aggregate_suite(&mut tree.root, &mut reports);
        debug!("Finalized {} case results: {}", recorded, totals);
        totals
    }
}

fn aggregate_suite(suite: &mut Suite, reports: &mut [Option<CaseReport>]) -> Counts {
    let mut total = Counts::default();

    for child in &mut suite.children {
        total += match child {
            TestNode::Suite(nested) => aggregate_suite(nested, reports),
            TestNode::Case(case) => {
                if let Some(report) = reports.get_mut(case.id.0).and_then(Option::take) {
                    case.result = Some(CaseResult {
                        counts: report.counts(),
                        outcomes: report.outcomes,
                        sections: report.sections,
                        duration_ms: report.duration_ms,
                    });
                }
                case.counts()
            }
        };
    }

    suite.aggregate = total;
    total
}

/// True when every suite's aggregate equals the element-wise sum of its
/// children, recursively
pub fn aggregates_consistent(suite: &Suite) -> bool {
    let sum: Counts = suite.children.iter().map(TestNode::counts).sum();
    sum == suite.aggregate
        && suite.children.iter().all(|child| match child {
            TestNode::Suite(nested) => aggregates_consistent(nested),
            TestNode::Case(_) => true,
        })
}
