//! Crate-wide error taxonomy.
//!
//! Only `ResourceExhausted` is recoverable: the engine reacts by
//! shrinking the per-partition memory budget and replanning. Everything
//! else aborts the run with enough context (read id, partition) to
//! diagnose without re-running.

use crate::types::ReadId;
use thiserror::Error;

/// Errors that can abort (or, for `ResourceExhausted`, retry) a skim run.
#[derive(Debug, Error)]
pub enum SkimError {
    /// Index allocation for a partition failed. Recoverable by retrying
    /// with a smaller partition budget.
    #[error("index allocation failed for partition {partition} ({needed} entries requested)")]
    ResourceExhausted { partition: usize, needed: usize },

    /// A sequence is longer than the fixed-width position fields can
    /// represent. Fatal.
    #[error("sequence {read} is {len} bases long, above the {max} base cap")]
    SequenceTooLong { read: ReadId, len: usize, max: usize },

    /// Output stream write failure. Fatal; accepted hits are never
    /// silently dropped.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker thread died. Observed by the dispatcher at the join
    /// barrier; no partial-result salvage.
    #[error("worker thread panicked while processing partition {partition}")]
    WorkerPanicked { partition: usize },

    /// Programming-error assertion. Always fatal, never caught.
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}

pub type SkimResult<T> = Result<T, SkimError>;
