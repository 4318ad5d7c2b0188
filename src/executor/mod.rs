//! Test execution engine
//!
//! Execution strategies share one contract: run every scheduled case body
//! exactly once and hand each case's outcomes to the recorder before
//! returning. Strategies differ only in when and where bodies run.

mod distributed;
mod parallel;
mod sequential;
pub mod worker;

pub use distributed::{DistributedExecutor, WorkerCommand};
pub use parallel::{default_workers, ParallelExecutor};
pub use sequential::{SequentialExecutor, ShuffledExecutor};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{EngineError, Result};
use crate::models::{AssertionOutcome, CaseContext, CaseReport, ErrorKind, ScheduledCase};
use crate::results::OutcomeRecorder;
use crate::utils::panic_message;
use crate::utils::timer::Timer;

/// Pluggable execution policy
pub trait Executor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Seed that fixes the execution order, when the order is randomized
    fn seed(&self) -> Option<u64> {
        None
    }

    /// Number of bodies that may run at the same time
    fn concurrency(&self) -> usize {
        1
    }

    /// Run every case in `pending` exactly once, recording each case's
    /// outcomes. Cases not started because of `abort` are recorded as
    /// aborted errors.
    fn execute(
        &self,
        pending: Vec<ScheduledCase>,
        recorder: Arc<OutcomeRecorder>,
        abort: AbortSignal,
    ) -> BoxFuture<'_, Result<()>>;
}

/// Strategy names accepted by the runner
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Sequential,
    Shuffled,
    Parallel,
    Distributed,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::Shuffled => "shuffled",
            Strategy::Parallel => "parallel",
            Strategy::Distributed => "distributed",
        }
    }

    pub fn all() -> [Strategy; 4] {
        [
            Strategy::Sequential,
            Strategy::Shuffled,
            Strategy::Parallel,
            Strategy::Distributed,
        ]
    }
}

impl FromStr for Strategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sequential" | "seq" => Ok(Strategy::Sequential),
            "shuffled" | "shuffle" | "random" => Ok(Strategy::Shuffled),
            "parallel" | "threads" => Ok(Strategy::Parallel),
            "distributed" | "processes" => Ok(Strategy::Distributed),
            _ => Err(EngineError::UnknownStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stops dispatch of new cases once triggered or once its deadline passes.
/// In-flight bodies always run to completion.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn reason(&self) -> &'static str {
        if self.flag.load(Ordering::SeqCst) {
            "aborted before start: run was cancelled"
        } else {
            "aborted before start: run timeout elapsed"
        }
    }
}

/// Run one case body, converting a returned error or a panic into an
/// `Error` outcome. Later assertions of a body that errors are never
/// evaluated.
pub fn run_case(case: &ScheduledCase) -> CaseReport {
    let timer = Timer::start(case.full_name());
    let mut ctx = CaseContext::new();

    let result = catch_unwind(AssertUnwindSafe(|| case.body.call(&mut ctx)));

    let failure = match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some((ErrorKind::Exception, format!("{e:#}"))),
        Err(payload) => Some((ErrorKind::Panic, panic_message(payload.as_ref()))),
    };
    if let Some((kind, message)) = failure {
        let location = ctx.last_location();
        ctx.push(AssertionOutcome::Error {
            kind,
            message,
            location,
        });
    }

    let (outcomes, sections) = ctx.into_parts();
    CaseReport {
        case: case.id,
        path: case.full_name(),
        outcomes,
        sections,
        duration_ms: timer.stop(),
    }
}

/// Report for a case that was never started
pub fn aborted_report(case: &ScheduledCase, abort: &AbortSignal) -> CaseReport {
    CaseReport::new(
        case.id,
        case.full_name(),
        vec![AssertionOutcome::error(ErrorKind::Aborted, abort.reason())],
    )
}
