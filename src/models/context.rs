//! Case-local assertion buffer
//!
//! A `CaseContext` is handed to every case body. Assertions append to it in
//! evaluation order; the buffer is flushed to the recorder once the body
//! returns, errors or panics.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::panic::Location;

use super::outcome::{AssertionOutcome, Counts};
use super::tree::CaseId;

/// A named block nested inside a case, kept for reporting only
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionReport {
    /// Section names from the outermost section down, excluding the case
    pub path: Vec<String>,
    pub counts: Counts,
}

impl SectionReport {
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// Everything one case execution produced
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub case: CaseId,
    /// Dotted full path of the case, used to validate merged batches
    pub path: String,
    pub outcomes: Vec<AssertionOutcome>,
    #[serde(default)]
    pub sections: Vec<SectionReport>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl CaseReport {
    pub fn new(case: CaseId, path: impl Into<String>, outcomes: Vec<AssertionOutcome>) -> Self {
        Self {
            case,
            path: path.into(),
            outcomes,
            sections: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn counts(&self) -> Counts {
        Counts::from_outcomes(&self.outcomes)
    }
}

/// Assertion sink for the currently executing case
#[derive(Debug, Default)]
pub struct CaseContext {
    outcomes: Vec<AssertionOutcome>,
    sections: Vec<SectionReport>,
    open_sections: Vec<String>,
    last_location: Option<&'static Location<'static>>,
}

impl CaseContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a boolean check
    #[track_caller]
    pub fn check(&mut self, expression: &str, passed: bool) -> bool {
        self.last_location = Some(Location::caller());
        if passed {
            self.outcomes.push(AssertionOutcome::Pass);
        } else {
            self.outcomes
                .push(AssertionOutcome::fail(expression, "evaluated to false"));
        }
        passed
    }

    /// Record an equality check, keeping both evaluated sides on failure
    #[track_caller]
    pub fn check_eq<T>(&mut self, expression: &str, left: T, right: T) -> bool
    where
        T: PartialEq + Debug,
    {
        self.last_location = Some(Location::caller());
        if left == right {
            self.outcomes.push(AssertionOutcome::Pass);
            true
        } else {
            self.outcomes.push(AssertionOutcome::fail(
                expression,
                format!("{left:?} != {right:?}"),
            ));
            false
        }
    }

    /// Record an unconditional failure
    #[track_caller]
    pub fn fail(&mut self, expression: &str, evaluated: impl Into<String>) {
        self.last_location = Some(Location::caller());
        self.outcomes
            .push(AssertionOutcome::fail(expression, evaluated));
    }

    /// Record a known failure; reported but never fails the run
    #[track_caller]
    pub fn broken(&mut self, expression: &str, reason: impl Into<String>) {
        self.last_location = Some(Location::caller());
        self.outcomes
            .push(AssertionOutcome::broken(expression, reason));
    }

    /// Run a nested block inline. The section shows up in reports under
    /// its case but is not scheduled on its own.
    pub fn section<F>(&mut self, name: &str, body: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut CaseContext) -> anyhow::Result<()>,
    {
        self.open_sections.push(name.to_string());
        let start = self.outcomes.len();
        let slot = self.sections.len();
        self.sections.push(SectionReport {
            path: self.open_sections.clone(),
            counts: Counts::default(),
        });

        let result = body(self);

        self.sections[slot].counts = Counts::from_outcomes(&self.outcomes[start..]);
        self.open_sections.pop();
        result
    }

    pub fn outcomes(&self) -> &[AssertionOutcome] {
        &self.outcomes
    }

    /// Source location of the most recently evaluated assertion
    pub fn last_location(&self) -> Option<String> {
        self.last_location
            .map(|l| format!("{}:{}", l.file(), l.line()))
    }

    /// Append the outcome of a body that ended abnormally
    pub(crate) fn push(&mut self, outcome: AssertionOutcome) {
        self.outcomes.push(outcome);
    }

    pub(crate) fn into_parts(self) -> (Vec<AssertionOutcome>, Vec<SectionReport>) {
        (self.outcomes, self.sections)
    }
}
