//! Multi-process execution
//!
//! The coordinator splits the work list round-robin into one lane per
//! worker process and feeds each lane to its process one case at a time.
//! Processes share no memory; results come back as serialized batches and
//! are merged through the same recorder as every other strategy. A process
//! that dies mid-case gets that case marked as a process failure and is
//! replaced for the rest of its lane.

use futures::future::{join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use super::worker::{parse_batch, WorkRequest, WORKER_ENV};
use super::{aborted_report, AbortSignal, Executor};
use crate::error::{EngineError, Result};
use crate::models::{AssertionOutcome, CaseReport, ErrorKind, ScheduledCase};
use crate::results::OutcomeRecorder;

/// Program and arguments that start one worker process
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Re-invoke the running executable with `args`
    pub fn current_exe<I, S>(args: I) -> std::io::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            program: std::env::current_exe()?,
            args: args.into_iter().map(Into::into).collect(),
        })
    }

    fn display(&self) -> String {
        self.program.display().to_string()
    }
}

/// Process-pool executor
#[derive(Clone, Debug)]
pub struct DistributedExecutor {
    workers: usize,
    command: WorkerCommand,
}

impl DistributedExecutor {
    pub fn new(workers: usize, command: WorkerCommand) -> Self {
        Self {
            workers: workers.max(1),
            command,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Executor for DistributedExecutor {
    fn name(&self) -> &'static str {
        "distributed"
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

            let lanes = partition(pending, self.workers);
            info!(
                "Distributing cases over {} worker processes ({})",
                lanes.len(),
                self.command.display()
            );

            let handles: Vec<_> = lanes
                .into_iter()
                .enumerate()
                .map(|(worker, lane)| {
                    tokio::spawn(run_lane(
                        worker,
                        lane,
                        self.command.clone(),
                        recorder.clone(),
                        abort.clone(),
                    ))
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

            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }
}

/// Round-robin split into at most `workers` non-empty lanes
fn partition(pending: Vec<ScheduledCase>, workers: usize) -> Vec<Vec<ScheduledCase>> {
    let lanes = workers.clamp(1, pending.len().max(1));
    let mut split: Vec<Vec<ScheduledCase>> = (0..lanes).map(|_| Vec::new()).collect();
    for (index, case) in pending.into_iter().enumerate() {
        split[index % lanes].push(case);
    }
    split
}

async fn run_lane(
    worker: usize,
    lane: Vec<ScheduledCase>,
    command: WorkerCommand,
    recorder: Arc<OutcomeRecorder>,
    abort: AbortSignal,
) -> Result<()> {
    let mut process: Option<WorkerProcess> = None;

    for case in &lane {
        if abort.is_aborted() {
            recorder.record(aborted_report(case, &abort))?;
            continue;
        }

        if process.is_none() {
            match WorkerProcess::spawn(&command, worker) {
                Ok(spawned) => process = Some(spawned),
                Err(e) => {
                    warn!("Worker {} failed to start: {}", worker, e);
                    recorder.record(failure_report(
                        case,
                        ErrorKind::WorkerCrashed,
                        format!("{e}: {}", source_message(&e)),
                    ))?;
                    continue;
                }
            }
        }
        let Some(active) = process.as_mut() else {
            continue;
        };

        let failure = match active.exchange(case).await {
            Ok(report) => match recorder.record(report) {
                Ok(()) => continue,
                Err(e) => LaneFailure::Protocol(format!("batch from worker {worker} rejected: {e}")),
            },
            Err(failure) => failure,
        };

        let (kind, message) = match failure {
            LaneFailure::Exited => {
                let status = active.reap().await;
                (
                    ErrorKind::WorkerCrashed,
                    format!("worker process {worker} died while running this case ({status})"),
                )
            }
            LaneFailure::Protocol(detail) => {
                active.kill().await;
                (ErrorKind::Protocol, detail)
            }
        };
        warn!("{}: {}", case.full_name(), message);
        recorder.record(failure_report(case, kind, message))?;
        process = None;
    }

    if let Some(active) = process {
        active.shutdown().await;
    }
    debug!("Worker lane {} finished {} cases", worker, lane.len());
    Ok(())
}

fn failure_report(case: &ScheduledCase, kind: ErrorKind, message: String) -> CaseReport {
    CaseReport::new(
        case.id,
        case.full_name(),
        vec![AssertionOutcome::error(kind, message)],
    )
}

fn source_message(e: &EngineError) -> String {
    std::error::Error::source(e)
        .map(ToString::to_string)
        .unwrap_or_default()
}

enum LaneFailure {
    /// stdin or stdout closed before a batch arrived
    Exited,
    /// The worker answered with something unusable
    Protocol(String),
}

struct WorkerProcess {
    worker: usize,
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl WorkerProcess {
    fn spawn(command: &WorkerCommand, worker: usize) -> Result<Self> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .env(WORKER_ENV, worker.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::WorkerSpawn {
                program: command.display(),
                source,
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                return Err(EngineError::WorkerSpawn {
                    program: command.display(),
                    source: std::io::Error::other("worker pipes unavailable"),
                })
            }
        };

        debug!("Started worker {} (pid {:?})", worker, child.id());
        Ok(Self {
            worker,
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    /// Send one case and wait for its batch
    async fn exchange(&mut self, case: &ScheduledCase) -> std::result::Result<CaseReport, LaneFailure> {
        let mut request = serde_json::to_string(&WorkRequest::for_case(case))
            .map_err(|e| LaneFailure::Protocol(format!("failed to encode work request: {e}")))?;
        request.push('\n');

        if self.stdin.write_all(request.as_bytes()).await.is_err()
            || self.stdin.flush().await.is_err()
        {
            return Err(LaneFailure::Exited);
        }

        loop {
            let line = match self.stdout.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) => return Err(LaneFailure::Exited),
            };

            match parse_batch(&line) {
                None => debug!("worker {}: {}", self.worker, line),
                Some(Err(e)) => {
                    return Err(LaneFailure::Protocol(format!(
                        "unreadable outcome batch from worker {}: {e}",
                        self.worker
                    )))
                }
                Some(Ok(report)) if report.case != case.id || report.path != case.full_name() => {
                    return Err(LaneFailure::Protocol(format!(
                        "worker {} answered for case {} ({}) while running {} ({})",
                        self.worker,
                        report.case,
                        report.path,
                        case.id,
                        case.full_name()
                    )))
                }
                Some(Ok(report)) => return Ok(report),
            }
        }
    }

    async fn reap(&mut self) -> String {
        match self.child.wait().await {
            Ok(status) => describe_exit(status),
            Err(e) => format!("exit status unavailable: {e}"),
        }
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            debug!("Failed to kill worker {}: {}", self.worker, e);
        }
    }

    /// Close stdin so the worker exits on its own, then wait for it
    async fn shutdown(self) {
        let WorkerProcess {
            worker,
            mut child,
            stdin,
            ..
        } = self;
        drop(stdin);
        match child.wait().await {
            Ok(status) if status.success() => debug!("Worker {} exited cleanly", worker),
            Ok(status) => warn!("Worker {} exited with {}", worker, describe_exit(status)),
            Err(e) => warn!("Failed to wait for worker {}: {}", worker, e),
        }
    }
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => format!("terminated: {status}"),
    }
}
