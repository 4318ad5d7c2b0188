//! In-order and shuffled execution
//!
//! Both strategies run one body at a time on a single blocking thread.
//! Shuffled permutes the work list with a seeded generator first.

use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, info};

use super::{aborted_report, run_case, AbortSignal, Executor};
use crate::error::Result;
use crate::models::ScheduledCase;
use crate::results::OutcomeRecorder;

/// Runs cases in discovery order
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialExecutor;

impl Executor for SequentialExecutor {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn execute(
        &self,
        pending: Vec<ScheduledCase>,
        recorder: Arc<OutcomeRecorder>,
        abort: AbortSignal,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || run_in_order(pending, &recorder, &abort)).await?
        })
    }
}

/// Runs cases in a seeded random permutation of discovery order
#[derive(Clone, Copy, Debug)]
pub struct ShuffledExecutor {
    seed: u64,
}

impl ShuffledExecutor {
    /// Use `seed`, or draw one when absent. The seed is logged either way
    /// so a failing order can be replayed.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            seed: seed.unwrap_or_else(rand::random),
        }
    }

    /// The order cases will run in
    pub fn permute(&self, mut pending: Vec<ScheduledCase>) -> Vec<ScheduledCase> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        pending.shuffle(&mut rng);
        pending
    }
}

impl Executor for ShuffledExecutor {
    fn name(&self) -> &'static str {
        "shuffled"
    }

    fn seed(&self) -> Option<u64> {
        Some(self.seed)
    }

    fn execute(
        &self,
        pending: Vec<ScheduledCase>,
        recorder: Arc<OutcomeRecorder>,
        abort: AbortSignal,
    ) -> BoxFuture<'_, Result<()>> {
        info!("Shuffling {} cases with seed {}", pending.len(), self.seed);
        let permuted = self.permute(pending);

        Box::pin(async move {
            tokio::task::spawn_blocking(move || run_in_order(permuted, &recorder, &abort)).await?
        })
    }
}

fn run_in_order(
    pending: Vec<ScheduledCase>,
    recorder: &OutcomeRecorder,
    abort: &AbortSignal,
) -> Result<()> {
    for case in &pending {
        if abort.is_aborted() {
            recorder.record(aborted_report(case, abort))?;
            continue;
        }

        debug!("Running {}", case.full_name());
        recorder.record(run_case(case))?;
    }
    Ok(())
}
