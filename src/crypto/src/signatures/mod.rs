//! Ed25519 signature verification

use crate::error::{CryptoError, Result};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use hgraph_core::traits::SignatureVerifier;
use tracing::trace;

/// Verify `signature` over `message`, reporting why it failed
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
    let key_bytes: [u8; 32] = public_key
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| CryptoError::InvalidPublicKey)?;

    let signature = Signature::from_slice(signature)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

    key.verify(message, &signature)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}

/// Stateless Ed25519 verifier
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Verifier;

impl Ed25519Verifier {
    pub fn new() -> Self {
        Self
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, data: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        match verify_signature(public_key, data, signature) {
            Ok(()) => true,
            Err(e) => {
                trace!(error = %e, "Signature rejected");
                false
            }
        }
    }
}
