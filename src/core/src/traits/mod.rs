//! Shared traits for the intake and reconnect pipeline

pub mod callbacks;
pub mod security;
pub mod transport;

// Re-export commonly used traits
pub use callbacks::{ApplicationCallbacks, NoopCallbacks};
pub use security::SignatureVerifier;
pub use transport::{Connection, Transport};
