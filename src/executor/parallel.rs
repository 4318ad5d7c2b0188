//! Parallel test execution
//!
//! A fixed pool of worker threads claims cases from a shared atomic index,
//! so no two workers ever run the same case and a slow body only occupies
//! its own worker.

use futures::future::{join_all, BoxFuture};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{aborted_report, run_case, AbortSignal, Executor};
use crate::error::Result;
use crate::models::ScheduledCase;
use crate::results::OutcomeRecorder;

/// Worker count used when none is configured
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Thread-pool executor
#[derive(Clone, Copy, Debug)]
pub struct ParallelExecutor {
    workers: usize,
}

impl ParallelExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Default for ParallelExecutor {
    fn default() -> Self {
        Self::new(default_workers())
    }
}

impl Executor for ParallelExecutor {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn concurrency(&self) -> usize {
        self.workers
    }

    fn execute(
        &self,
        pending: Vec<ScheduledCase>,
        recorder: Arc<OutcomeRecorder>,
        abort: AbortSignal,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if pending.is_empty() {
                return Ok(());
            }

            let workers = self.workers.min(pending.len());
            info!(
                "Running {} cases on {} worker threads",
                pending.len(),
                workers
            );

            let start = Instant::now();
            let pending = Arc::new(pending);
            let next = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let pending = pending.clone();
                    let next = next.clone();
                    let recorder = recorder.clone();
                    let abort = abort.clone();
                    tokio::task::spawn_blocking(move || {
                        worker_loop(worker, &pending, &next, &recorder, &abort)
                    })
                })
                .collect();

            let mut first_error = None;
            for joined in join_all(handles).await {
                let result = match joined {
                    Ok(result) => result,
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = result {
                    first_error.get_or_insert(e);
                }
            }

            debug!(
                "Parallel execution finished in {}ms",
                start.elapsed().as_millis()
            );

            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }
}

fn worker_loop(
    worker: usize,
    pending: &[ScheduledCase],
    next: &AtomicUsize,
    recorder: &OutcomeRecorder,
    abort: &AbortSignal,
) -> Result<()> {
    let mut executed = 0usize;

    loop {
        let index = next.fetch_add(1, Ordering::SeqCst);
        let Some(case) = pending.get(index) else {
            break;
        };

        if abort.is_aborted() {
            recorder.record(aborted_report(case, abort))?;
            continue;
        }

        debug!("Worker {} running {}", worker, case.full_name());
        recorder.record(run_case(case))?;
        executed += 1;
    }

    debug!("Worker {} done after {} cases", worker, executed);
    Ok(())
}
