//! Security-related traits

/// Signature verification
///
/// Verification is CPU-bound and synchronous so it can run on rayon workers.
pub trait SignatureVerifier: Send + Sync {
    /// Verify `signature` over `data` with `public_key`
    fn verify(&self, data: &[u8], signature: &[u8], public_key: &[u8]) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Mock verifier for testing
    struct EqualityVerifier;

    impl SignatureVerifier for EqualityVerifier {
        fn verify(&self, data: &[u8], signature: &[u8], _public_key: &[u8]) -> bool {
            data == signature
        }
    }

    #[test]
    fn test_mock_verifier() {
        let verifier = EqualityVerifier;
        assert!(verifier.verify(b"abc", b"abc", &[]));
        assert!(!verifier.verify(b"abc", b"abd", &[]));
    }
}
