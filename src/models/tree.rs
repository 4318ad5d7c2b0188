//! Test tree model
//!
//! A tree of suites and cases built once by running suite bodies eagerly.
//! Case bodies are deferred: building a case only registers it in the
//! pending work list. After the build pass the shape is frozen and only
//! case results and suite aggregates are written.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use super::context::{CaseContext, SectionReport};
use super::outcome::{AssertionOutcome, Counts, ErrorKind};
use crate::utils::panic_message;

/// Name of the synthetic case that carries a suite's build error
pub const BUILD_ERROR_CASE: &str = "<build>";

/// Stable identifier of a case, assigned in discovery order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub usize);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type BodyFn = dyn Fn(&mut CaseContext) -> anyhow::Result<()> + Send + Sync;

/// Deferred case body
#[derive(Clone)]
pub struct CaseBody(Arc<BodyFn>);

impl CaseBody {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&mut CaseContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(body))
    }

    pub fn call(&self, ctx: &mut CaseContext) -> anyhow::Result<()> {
        (self.0)(ctx)
    }
}

impl fmt::Debug for CaseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CaseBody(..)")
    }
}

/// Join a node path and name into the dotted form used for filtering,
/// merging and JUnit `classname`
pub fn dotted(path: &[String], name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path.join("."), name)
    }
}

/// Result written into a case after execution
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CaseResult {
    pub counts: Counts,
    pub outcomes: Vec<AssertionOutcome>,
    pub sections: Vec<SectionReport>,
    pub duration_ms: u64,
}

impl CaseResult {
    pub fn from_outcomes(outcomes: Vec<AssertionOutcome>) -> Self {
        Self {
            counts: Counts::from_outcomes(&outcomes),
            outcomes,
            sections: Vec::new(),
            duration_ms: 0,
        }
    }

    /// First Fail or Error outcome, if any
    pub fn first_failure(&self) -> Option<&AssertionOutcome> {
        self.outcomes.iter().find(|o| o.is_failure())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Case {
    pub id: CaseId,
    pub name: String,
    pub path: Vec<String>,
    #[serde(skip)]
    pub body: Option<CaseBody>,
    /// `None` until executed; stays `None` for cases pruned by a filter
    pub result: Option<CaseResult>,
}

impl Case {
    pub fn full_name(&self) -> String {
        dotted(&self.path, &self.name)
    }

    pub fn counts(&self) -> Counts {
        self.result.as_ref().map(|r| r.counts).unwrap_or_default()
    }

    pub fn is_build_error(&self) -> bool {
        self.body.is_none() && self.name == BUILD_ERROR_CASE
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Suite {
    pub name: String,
    pub path: Vec<String>,
    pub children: Vec<TestNode>,
    /// Only meaningful after the recorder has finalized the tree
    pub aggregate: Counts,
    pub build_error: Option<String>,
}

impl Suite {
    fn new(name: impl Into<String>, path: Vec<String>) -> Self {
        Self {
            name: name.into(),
            path,
            children: Vec::new(),
            aggregate: Counts::default(),
            build_error: None,
        }
    }

    pub fn full_name(&self) -> String {
        dotted(&self.path, &self.name)
    }

    fn child_path(&self) -> Vec<String> {
        let mut path = self.path.clone();
        path.push(self.name.clone());
        path
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestNode {
    Suite(Suite),
    Case(Case),
}

impl TestNode {
    pub fn as_ref(&self) -> NodeRef<'_> {
        match self {
            TestNode::Suite(s) => NodeRef::Suite(s),
            TestNode::Case(c) => NodeRef::Case(c),
        }
    }

    pub fn counts(&self) -> Counts {
        self.as_ref().counts()
    }
}

/// Borrowed view of a node, yielded by [`TestTree::walk`]
#[derive(Clone, Copy, Debug)]
pub enum NodeRef<'a> {
    Suite(&'a Suite),
    Case(&'a Case),
}

impl<'a> NodeRef<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            NodeRef::Suite(s) => &s.name,
            NodeRef::Case(c) => &c.name,
        }
    }

    pub fn path(&self) -> &'a [String] {
        match self {
            NodeRef::Suite(s) => &s.path,
            NodeRef::Case(c) => &c.path,
        }
    }

    pub fn depth(&self) -> usize {
        self.path().len()
    }

    pub fn counts(&self) -> Counts {
        match self {
            NodeRef::Suite(s) => s.aggregate,
            NodeRef::Case(c) => c.counts(),
        }
    }
}

/// Pre-order iterator: suite before its children, children in discovery order
pub struct Walk<'a> {
    stack: Vec<NodeRef<'a>>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<NodeRef<'a>> {
        let node = self.stack.pop()?;
        if let NodeRef::Suite(suite) = node {
            self.stack
                .extend(suite.children.iter().rev().map(TestNode::as_ref));
        }
        Some(node)
    }
}

/// A case flattened into the work list handed to an execution strategy
#[derive(Clone, Debug)]
pub struct ScheduledCase {
    pub id: CaseId,
    pub name: String,
    pub path: Vec<String>,
    pub body: CaseBody,
}

impl ScheduledCase {
    pub fn full_name(&self) -> String {
        dotted(&self.path, &self.name)
    }
}

/// Hierarchy of suites and cases plus the pending work list
#[derive(Clone, Debug, Serialize)]
pub struct TestTree {
    pub root: Suite,
    #[serde(skip)]
    pending: Vec<ScheduledCase>,
    #[serde(skip)]
    case_count: usize,
}

impl TestTree {
    /// Run the build pass. `body` is the root suite's discovery callback.
    pub fn build<F>(name: &str, body: F) -> Self
    where
        F: FnOnce(&mut SuiteBuilder<'_>) -> anyhow::Result<()>,
    {
        let mut root = Suite::new(name, Vec::new());
        let mut pending = Vec::new();
        let mut next_id = 0;

        discover(&mut root, &mut pending, &mut next_id, body);

        debug!(
            "Built tree '{}' with {} cases ({} pending)",
            name,
            next_id,
            pending.len()
        );

        Self {
            root,
            pending,
            case_count: next_id,
        }
    }

    /// Cases still to be executed, in discovery order
    pub fn pending(&self) -> &[ScheduledCase] {
        &self.pending
    }

    pub(crate) fn pending_mut(&mut self) -> &mut Vec<ScheduledCase> {
        &mut self.pending
    }

    pub(crate) fn take_pending(&mut self) -> Vec<ScheduledCase> {
        std::mem::take(&mut self.pending)
    }

    /// Clear the error held by every build-error case whose dotted path
    /// `keep` rejects, so it reports like any other pruned case. Returns
    /// the number of cases cleared.
    pub(crate) fn prune_build_errors<F>(&mut self, keep: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        prune_build_errors(&mut self.root, &keep)
    }

    /// Number of case nodes in the tree, including build-error cases
    pub fn case_count(&self) -> usize {
        self.case_count
    }

    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![NodeRef::Suite(&self.root)],
        }
    }

    pub fn cases(&self) -> impl Iterator<Item = &Case> {
        self.walk().filter_map(|node| match node {
            NodeRef::Case(c) => Some(c),
            NodeRef::Suite(_) => None,
        })
    }

    pub fn suites(&self) -> impl Iterator<Item = &Suite> {
        self.walk().filter_map(|node| match node {
            NodeRef::Suite(s) => Some(s),
            NodeRef::Case(_) => None,
        })
    }

    pub fn find_case(&self, full_name: &str) -> Option<&Case> {
        self.cases().find(|c| c.full_name() == full_name)
    }

    pub fn find_suite(&self, full_name: &str) -> Option<&Suite> {
        self.suites().find(|s| s.full_name() == full_name)
    }

    /// Aggregate of the root suite
    pub fn totals(&self) -> Counts {
        self.root.aggregate
    }
}

/// Handle passed to suite bodies during the build pass
pub struct SuiteBuilder<'a> {
    suite: &'a mut Suite,
    pending: &'a mut Vec<ScheduledCase>,
    next_id: &'a mut usize,
}

impl SuiteBuilder<'_> {
    /// Ancestor names of the suite being built, root first, including itself
    pub fn path(&self) -> Vec<String> {
        self.suite.child_path()
    }

    /// Add a nested suite and run its body immediately. A failing body is
    /// recorded against the nested suite only; the caller keeps building.
    pub fn suite<F>(&mut self, name: &str, body: F)
    where
        F: FnOnce(&mut SuiteBuilder<'_>) -> anyhow::Result<()>,
    {
        let mut child = Suite::new(name, self.suite.child_path());
        discover(&mut child, self.pending, self.next_id, body);
        self.suite.children.push(TestNode::Suite(child));
    }

    /// Register a case; its body runs later, during the run phase
    pub fn case<F>(&mut self, name: &str, body: F)
    where
        F: Fn(&mut CaseContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = CaseId(*self.next_id);
        *self.next_id += 1;

        let path = self.suite.child_path();
        let body = CaseBody::new(body);

        self.pending.push(ScheduledCase {
            id,
            name: name.to_string(),
            path: path.clone(),
            body: body.clone(),
        });
        self.suite.children.push(TestNode::Case(Case {
            id,
            name: name.to_string(),
            path,
            body: Some(body),
            result: None,
        }));
    }
}

fn discover<F>(
    suite: &mut Suite,
    pending: &mut Vec<ScheduledCase>,
    next_id: &mut usize,
    body: F,
) where
    F: FnOnce(&mut SuiteBuilder<'_>) -> anyhow::Result<()>,
{
    let outcome = {
        let mut builder = SuiteBuilder {
            suite: &mut *suite,
            pending: &mut *pending,
            next_id: &mut *next_id,
        };
        catch_unwind(AssertUnwindSafe(|| body(&mut builder)))
    };

    let message = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => format!("{e:#}"),
        Err(payload) => format!("suite body panicked: {}", panic_message(payload.as_ref())),
    };

    warn!("Build error in suite '{}': {}", suite.full_name(), message);

    let id = CaseId(*next_id);
    *next_id += 1;

    let outcomes = vec![AssertionOutcome::Error {
        kind: ErrorKind::Exception,
        message: message.clone(),
        location: None,
    }];
    suite.children.push(TestNode::Case(Case {
        id,
        name: BUILD_ERROR_CASE.to_string(),
        path: suite.child_path(),
        body: None,
        result: Some(CaseResult::from_outcomes(outcomes)),
    }));
    suite.build_error = Some(message);
}

fn prune_build_errors(suite: &mut Suite, keep: &dyn Fn(&str) -> bool) -> usize {
    let mut cleared = 0;
    for child in &mut suite.children {
        match child {
            TestNode::Suite(nested) => cleared += prune_build_errors(nested, keep),
            TestNode::Case(case) if case.is_build_error() && !keep(&case.full_name()) => {
                if case.result.take().is_some() {
                    cleared += 1;
                }
            }
            TestNode::Case(_) => {}
        }
    }
    cleared
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample() -> TestTree {
        TestTree::build("root", |s| {
            s.case("first", |t| {
                t.check("true", true);
                Ok(())
            });
            s.suite("math", |s| {
                s.case("adds", |t| {
                    t.check_eq("1 + 1 == 2", 1 + 1, 2);
                    Ok(())
                });
                s.suite("deep", |s| {
                    s.case("muls", |_| Ok(()));
                    Ok(())
                });
                Ok(())
            });
            s.case("last", |_| Ok(()));
            Ok(())
        })
    }

    #[test]
    fn test_build_registers_cases_in_discovery_order() {
        let tree = sample();
        let names: Vec<String> = tree.pending().iter().map(|c| c.full_name()).collect();
        assert_eq!(
            names,
            vec!["root.first", "root.math.adds", "root.math.deep.muls", "root.last"]
        );
        assert_eq!(tree.case_count(), 4);

        let ids: Vec<usize> = tree.pending().iter().map(|c| c.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_walk_is_preorder() {
        let tree = sample();
        let visited: Vec<(usize, &str)> = tree.walk().map(|n| (n.depth(), n.name())).collect();
        assert_eq!(
            visited,
            vec![
                (0, "root"),
                (1, "first"),
                (1, "math"),
                (2, "adds"),
                (2, "deep"),
                (3, "muls"),
                (1, "last"),
            ]
        );
    }

    #[test]
    fn test_build_does_not_run_case_bodies() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let suite_runs = AtomicUsize::new(0);

        let tree = TestTree::build("root", |s| {
            suite_runs.fetch_add(1, Ordering::SeqCst);
            s.case("deferred", move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        assert_eq!(suite_runs.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(tree.pending().len(), 1);
    }

    #[test]
    fn test_build_error_is_isolated_to_its_suite() {
        let tree = TestTree::build("root", |s| {
            s.suite("broken", |s| {
                s.case("discovered", |_| Ok(()));
                anyhow::bail!("fixture missing");
            });
            s.suite("panicky", |_| panic!("bad discovery"));
            s.case("sibling", |_| Ok(()));
            Ok(())
        });

        let pending: Vec<String> = tree.pending().iter().map(|c| c.full_name()).collect();
        assert_eq!(pending, vec!["root.broken.discovered", "root.sibling"]);

        let broken = tree.find_suite("root.broken").unwrap();
        assert_eq!(broken.build_error.as_deref(), Some("fixture missing"));
        let marker = tree.find_case("root.broken.<build>").unwrap();
        assert!(marker.is_build_error());
        assert_eq!(marker.counts().error, 1);

        let panicky = tree.find_suite("root.panicky").unwrap();
        assert!(panicky
            .build_error
            .as_deref()
            .unwrap()
            .contains("bad discovery"));
    }
}
