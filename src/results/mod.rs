//! Outcome recording
//!
//! Collects per-case outcome batches from every strategy and folds them into
//! the tree once all cases have reported.

mod recorder;

pub use recorder::{aggregates_consistent, OutcomeRecorder};
