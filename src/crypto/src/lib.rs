//! # Hgraph Cryptography Module
//!
//! Event signing and verification primitives.
//!
//! ## Features
//!
//! - **Signatures**: Ed25519 key pairs for event and state signing
//! - **Verification**: [`Ed25519Verifier`] implementing the core `SignatureVerifier` trait
//! - **Hashing**: BLAKE3 helpers for Merkle state trees
//!
//! ## Module Structure
//!
//! ```text
//! crypto/
//! ├── signatures/    - Ed25519 verifier
//! ├── keys/          - Key pair generation and signing
//! └── hash/          - BLAKE3 helpers
//! ```

pub mod error;
pub mod hash;
pub mod keys;
pub mod signatures;

pub use error::{CryptoError, Result};
pub use keys::KeyPair;
pub use signatures::Ed25519Verifier;
