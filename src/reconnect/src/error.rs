//! Error types for reconnect

use hgraph_core::{CoreError, NodeId, Round};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReconnectError>;

#[derive(Debug, Error)]
pub enum ReconnectError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Reconnect timed out")]
    Timeout,

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Teacher {teacher} declined: {reason}")]
    Declined { teacher: NodeId, reason: String },

    #[error("Offered round {offered} is not ahead of local round {local}")]
    StaleOffer { offered: Round, local: Round },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Root hash mismatch: expected {expected}, got {actual}")]
    RootMismatch { expected: String, actual: String },

    #[error("Insufficient signatures: {signed}/{total} weight")]
    InsufficientSignatures { signed: u64, total: u64 },

    #[error("No roster covers round {0}")]
    NoRoster(Round),

    #[error("Snapshot round {actual} does not match offered round {expected}")]
    SnapshotRoundMismatch { expected: Round, actual: Round },

    #[error("State store error: {0}")]
    Store(String),

    #[error("Node has not fallen behind")]
    NotBehind,

    #[error("Reconnect already in progress")]
    AlreadyInProgress,

    #[error("No eligible teacher")]
    NoEligibleTeacher,

    #[error("Recovery stalled after {attempts} failed teacher(s)")]
    Stalled { attempts: usize },

    #[error("Reconnect cancelled")]
    Cancelled,

    #[error("Invalid state tree: {0}")]
    InvalidTree(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error(transparent)]
    Core(CoreError),
}

impl ReconnectError {
    /// Whether another teacher may succeed where this attempt failed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconnectError::Transport(_)
                | ReconnectError::Timeout
                | ReconnectError::ConnectionClosed
                | ReconnectError::Declined { .. }
                | ReconnectError::StaleOffer { .. }
                | ReconnectError::Protocol(_)
                | ReconnectError::Serialization(_)
                | ReconnectError::RootMismatch { .. }
                | ReconnectError::InsufficientSignatures { .. }
                | ReconnectError::NoRoster(_)
                | ReconnectError::SnapshotRoundMismatch { .. }
                | ReconnectError::Store(_)
        )
    }
}

impl From<CoreError> for ReconnectError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Transport(msg) => ReconnectError::Transport(msg),
            CoreError::Timeout => ReconnectError::Timeout,
            CoreError::ConnectionClosed => ReconnectError::ConnectionClosed,
            CoreError::Serialization(msg) => ReconnectError::Serialization(msg),
            other => ReconnectError::Core(other),
        }
    }
}

impl From<bincode::Error> for ReconnectError {
    fn from(e: bincode::Error) -> Self {
        ReconnectError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ReconnectError::Timeout.is_retryable());
        assert!(ReconnectError::StaleOffer { offered: 3, local: 5 }.is_retryable());
        assert!(ReconnectError::InsufficientSignatures { signed: 1, total: 9 }.is_retryable());
        assert!(!ReconnectError::Cancelled.is_retryable());
        assert!(!ReconnectError::AlreadyInProgress.is_retryable());
        assert!(!ReconnectError::Stalled { attempts: 3 }.is_retryable());
    }

    #[test]
    fn test_core_errors_map_to_transport_variants() {
        let e: ReconnectError = CoreError::ConnectionClosed.into();
        assert!(matches!(e, ReconnectError::ConnectionClosed));

        let e: ReconnectError = CoreError::configuration("x").into();
        assert!(matches!(e, ReconnectError::Core(_)));
    }
}
