//! Assertion outcomes and count aggregates
//!
//! Defines the per-assertion outcome type and the `Counts` tally that is
//! summed bottom-up through the test tree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Why an `Error` outcome was produced
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The body returned an error outside assertion context
    Exception,
    /// The body panicked
    Panic,
    /// The case was never started because the run was aborted
    Aborted,
    /// The worker process running the case died
    WorkerCrashed,
    /// A worker sent something the coordinator could not attribute
    Protocol,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Exception => "exception",
            ErrorKind::Panic => "panic",
            ErrorKind::Aborted => "aborted",
            ErrorKind::WorkerCrashed => "process-failure",
            ErrorKind::Protocol => "protocol",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of evaluating one assertion inside a case body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssertionOutcome {
    Pass,
    Fail {
        expression: String,
        evaluated: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
        location: Option<String>,
    },
    /// Known failure; never counts toward an overall failure
    Broken { expression: String, reason: String },
}

impl AssertionOutcome {
    pub fn fail(expression: impl Into<String>, evaluated: impl Into<String>) -> Self {
        AssertionOutcome::Fail {
            expression: expression.into(),
            evaluated: evaluated.into(),
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        AssertionOutcome::Error {
            kind,
            message: message.into(),
            location: None,
        }
    }

    pub fn broken(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        AssertionOutcome::Broken {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, AssertionOutcome::Pass)
    }

    /// Fail or Error
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            AssertionOutcome::Fail { .. } | AssertionOutcome::Error { .. }
        )
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            AssertionOutcome::Pass => "✓",
            AssertionOutcome::Fail { .. } => "✗",
            AssertionOutcome::Error { .. } => "!",
            AssertionOutcome::Broken { .. } => "○",
        }
    }
}

impl fmt::Display for AssertionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertionOutcome::Pass => write!(f, "PASS"),
            AssertionOutcome::Fail {
                expression,
                evaluated,
            } => write!(f, "FAIL {expression} ({evaluated})"),
            AssertionOutcome::Error {
                kind,
                message,
                location,
            } => {
                write!(f, "ERROR [{kind}] {message}")?;
                if let Some(location) = location {
                    write!(f, " at {location}")?;
                }
                Ok(())
            }
            AssertionOutcome::Broken { expression, reason } => {
                write!(f, "BROKEN {expression} - {reason}")
            }
        }
    }
}

/// Per-kind outcome tally
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Counts {
    pub pass: u64,
    pub fail: u64,
    pub error: u64,
    pub broken: u64,
}

impl Counts {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a AssertionOutcome>) -> Self {
        let mut counts = Counts::default();
        for outcome in outcomes {
            counts.tally(outcome);
        }
        counts
    }

    pub fn tally(&mut self, outcome: &AssertionOutcome) {
        match outcome {
            AssertionOutcome::Pass => self.pass += 1,
            AssertionOutcome::Fail { .. } => self.fail += 1,
            AssertionOutcome::Error { .. } => self.error += 1,
            AssertionOutcome::Broken { .. } => self.broken += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.pass + self.fail + self.error + self.broken
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }

    /// `fail + error == 0`; broken outcomes never fail a run
    pub fn is_success(&self) -> bool {
        self.fail + self.error == 0
    }
}

impl Add for Counts {
    type Output = Counts;

    fn add(self, rhs: Counts) -> Counts {
        Counts {
            pass: self.pass + rhs.pass,
            fail: self.fail + rhs.fail,
            error: self.error + rhs.error,
            broken: self.broken + rhs.broken,
        }
    }
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Counts) {
        *self = *self + rhs;
    }
}

impl Sum for Counts {
    fn sum<I: Iterator<Item = Counts>>(iter: I) -> Counts {
        iter.fold(Counts::default(), Add::add)
    }
}

impl fmt::Display for Counts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pass={} fail={} error={} broken={}",
            self.pass, self.fail, self.error, self.broken
        )
    }
}
