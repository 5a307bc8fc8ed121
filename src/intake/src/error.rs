//! Error types for the intake module

use hgraph_core::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IntakeError>;

#[derive(Debug, Error)]
pub enum IntakeError {
    /// Caller broke a contract, e.g. moved the event window backwards
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}
