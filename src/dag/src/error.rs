//! Error types for the DAG module

use hgraph_core::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DagError>;

#[derive(Debug, Error)]
pub enum DagError {
    /// A contract the caller must uphold was broken (e.g. window regression)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}
