//! Error types for the node pipeline

use hgraph_core::CoreError;
use hgraph_dag::DagError;
use hgraph_intake::IntakeError;
use hgraph_reconnect::ReconnectError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NodeError>;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Linker error: {0}")]
    Dag(#[from] DagError),

    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),

    #[error("Reconnect error: {0}")]
    Reconnect(#[from] ReconnectError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl NodeError {
    /// Whether the pipeline instance must be torn down
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NodeError::Dag(DagError::InvariantViolation(_))
                | NodeError::Intake(IntakeError::InvariantViolation(_))
        )
    }
}
