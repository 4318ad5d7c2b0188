//! Data models for test trees
//!
//! Suites, cases, assertion outcomes and the per-case assertion buffer.

mod context;
mod outcome;
mod tree;

pub use context::{CaseContext, CaseReport, SectionReport};
pub use outcome::{AssertionOutcome, Counts, ErrorKind};
pub use tree::{
    dotted, Case, CaseBody, CaseId, CaseResult, NodeRef, ScheduledCase, Suite, SuiteBuilder,
    TestNode, TestTree, Walk, BUILD_ERROR_CASE,
};
