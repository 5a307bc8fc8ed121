//! Ed25519 key pairs for event and state signing

use ed25519_dalek::{Signer, SigningKey};
use hgraph_core::Event;
use rand::RngCore;

/// Node signing key
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Generate a new key pair from the OS RNG
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        let mut seed = [0u8; 32];
        csprng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Deterministic key pair from a 32-byte seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        KeyPair {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// Verifying key bytes as stored in a roster entry
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.signing.verifying_key().to_bytes().to_vec()
    }

    /// Sign arbitrary bytes
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }

    /// Sign an event over its hash
    pub fn sign_event(&self, event: &mut Event) {
        let signature = self.sign(event.hash.as_bytes());
        event.sign(signature);
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(&self.public_key_bytes()[..4]))
            .finish()
    }
}
