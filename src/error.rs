//! Engine error types
//!
//! Per-case problems never surface here; they are converted to recorded
//! outcomes. These are faults of the engine itself or of its inputs.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::CaseId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("case {case} ({path}) was recorded twice")]
    DuplicateRecord { case: CaseId, path: String },

    #[error("case {0} does not exist in this tree")]
    UnknownCase(CaseId),

    #[error("outcome batch for case {case} names '{got}' but the tree has '{expected}'")]
    PathMismatch {
        case: CaseId,
        expected: String,
        got: String,
    },

    #[error("unknown strategy '{0}' (expected sequential, shuffled, parallel or distributed)")]
    UnknownStrategy(String),

    #[error("invalid filter pattern '{pattern}'")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("strategy returned while still holding the outcome recorder")]
    RecorderInUse,

    #[error("distributed execution requires a worker command")]
    MissingWorkerCommand,

    #[error("failed to start worker process '{program}'")]
    WorkerSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker I/O failed")]
    WorkerIo(#[from] std::io::Error),

    #[error("worker task failed to complete")]
    Join(#[from] tokio::task::JoinError),

    #[error("failed to serialize run results")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write report to {}", path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;
