//! Error types for the cryptography module

use thiserror::Error;

/// Result type alias for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid public key
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Invalid signature format
    #[error("Invalid signature format: {0}")]
    InvalidSignature(String),

    /// Signature verification failed (no details)
    #[error("Signature verification failed")]
    SignatureVerificationFailed,
}

impl From<CryptoError> for hgraph_core::CoreError {
    fn from(e: CryptoError) -> Self {
        hgraph_core::CoreError::Crypto(e.to_string())
    }
}
