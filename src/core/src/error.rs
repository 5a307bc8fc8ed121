//! Unified error types for the shared core
//!
//! Subsystem crates define their own error enums and convert into
//! [`CoreError`] where a value crosses a crate boundary.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type shared across the pipeline crates
#[derive(Debug, Error)]
pub enum CoreError {
    /// Peer connection could not be opened or used
    #[error("Transport error: {0}")]
    Transport(String),

    /// Cryptographic errors
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Serialization/Deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Roster history is malformed
    #[error("Invalid roster history: {0}")]
    InvalidRosterHistory(String),

    /// Event window would move backwards or is internally inconsistent
    #[error("Invalid event window: {0}")]
    InvalidEventWindow(String),

    /// A frame did not arrive in time
    #[error("Timeout")]
    Timeout,

    /// Connection closed by the remote side
    #[error("Connection closed")]
    ConnectionClosed,

    /// Malformed event or hash
    #[error("Invalid: {0}")]
    Invalid(String),
}

impl CoreError {
    /// Create a transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        CoreError::Transport(msg.into())
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        CoreError::Serialization(msg.into())
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        CoreError::Configuration(msg.into())
    }

    /// Create an invalid error
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        CoreError::Invalid(msg.into())
    }
}

impl From<bincode::Error> for CoreError {
    fn from(e: bincode::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}
