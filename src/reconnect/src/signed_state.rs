//! Signed state validation
//!
//! A state offered by a teacher is trusted only if enough roster weight for
//! its round signed its root hash.

use crate::error::{ReconnectError, Result};
use hgraph_core::traits::SignatureVerifier;
use hgraph_core::{NodeSignature, QuorumThreshold, Round, RosterHistory, Threshold};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Weight that validly signed a state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureTally {
    pub signed_weight: u64,
    pub total_weight: u64,
    pub valid_signers: usize,
}

/// Checks node signatures over a state root against the roster
pub struct SignedStateValidator {
    verifier: Arc<dyn SignatureVerifier>,
    threshold: Arc<dyn QuorumThreshold>,
}

impl SignedStateValidator {
    /// Validator requiring a strong minority of roster weight
    pub fn new(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self::with_threshold(verifier, Arc::new(Threshold::StrongMinority))
    }

    pub fn with_threshold(
        verifier: Arc<dyn SignatureVerifier>,
        threshold: Arc<dyn QuorumThreshold>,
    ) -> Self {
        Self {
            verifier,
            threshold,
        }
    }

    /// Tally signatures over `root_hash` for a state at `round`.
    ///
    /// Each node counts once. Signatures from non-members or that fail to
    /// verify contribute nothing.
    pub fn tally(
        &self,
        round: Round,
        root_hash: &[u8; 32],
        signatures: &[NodeSignature],
        roster_history: &RosterHistory,
    ) -> Result<SignatureTally> {
        let roster = roster_history
            .roster_for_round(round)
            .ok_or(ReconnectError::NoRoster(round))?;

        let mut seen = BTreeSet::new();
        let mut signed_weight = 0u64;
        let mut valid_signers = 0;

        for signature in signatures {
            if !seen.insert(signature.node_id) {
                debug!(node = %signature.node_id, "Ignoring duplicate state signature");
                continue;
            }

            let entry = match roster.get(&signature.node_id) {
                Some(entry) => entry,
                None => {
                    debug!(node = %signature.node_id, round, "State signer not in roster");
                    continue;
                }
            };

            if self
                .verifier
                .verify(root_hash, &signature.signature, &entry.public_key)
            {
                signed_weight = signed_weight.saturating_add(entry.weight);
                valid_signers += 1;
            } else {
                warn!(node = %signature.node_id, round, "Invalid state signature");
            }
        }

        Ok(SignatureTally {
            signed_weight,
            total_weight: roster.total_weight(),
            valid_signers,
        })
    }

    /// Fail unless the signatures meet the threshold
    pub fn validate(
        &self,
        round: Round,
        root_hash: &[u8; 32],
        signatures: &[NodeSignature],
        roster_history: &RosterHistory,
    ) -> Result<SignatureTally> {
        let tally = self.tally(round, root_hash, signatures, roster_history)?;

        if tally.signed_weight == 0
            || !self.threshold.is_met(tally.signed_weight, tally.total_weight)
        {
            return Err(ReconnectError::InsufficientSignatures {
                signed: tally.signed_weight,
                total: tally.total_weight,
            });
        }
        Ok(tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgraph_core::{NodeId, Roster, RosterEntry};
    use hgraph_crypto::{Ed25519Verifier, KeyPair};

    fn setup(n: u64) -> (Vec<KeyPair>, RosterHistory) {
        let keys: Vec<KeyPair> = (0..n).map(|_| KeyPair::generate()).collect();
        let roster = Roster::new(
            keys.iter()
                .enumerate()
                .map(|(i, k)| RosterEntry::new(NodeId(i as u64), k.public_key_bytes(), 10)),
        );
        (keys, RosterHistory::single(1, 1, roster))
    }

    fn sign(keys: &[KeyPair], ids: &[usize], root: &[u8; 32]) -> Vec<NodeSignature> {
        ids.iter()
            .map(|i| NodeSignature {
                node_id: NodeId(*i as u64),
                signature: keys[*i].sign(root),
            })
            .collect()
    }

    #[test]
    fn test_strong_minority_accepts_one_third() {
        let (keys, history) = setup(6);
        let root = [5u8; 32];
        let validator = SignedStateValidator::new(Arc::new(Ed25519Verifier));

        assert!(validator.validate(3, &root, &sign(&keys, &[0], &root), &history).is_err());
        let tally = validator
            .validate(3, &root, &sign(&keys, &[0, 1], &root), &history)
            .unwrap();
        assert_eq!(tally.signed_weight, 20);
        assert_eq!(tally.total_weight, 60);
    }

    #[test]
    fn test_duplicates_count_once() {
        let (keys, history) = setup(3);
        let root = [1u8; 32];
        let validator = SignedStateValidator::new(Arc::new(Ed25519Verifier));

        let tally = validator
            .tally(1, &root, &sign(&keys, &[0, 0, 0], &root), &history)
            .unwrap();
        assert_eq!(tally.valid_signers, 1);
    }

    #[test]
    fn test_signature_over_other_root_ignored() {
        let (keys, history) = setup(3);
        let validator = SignedStateValidator::new(Arc::new(Ed25519Verifier));
        let signatures = sign(&keys, &[0, 1, 2], &[9u8; 32]);

        let result = validator.validate(1, &[1u8; 32], &signatures, &history);
        assert!(matches!(
            result,
            Err(ReconnectError::InsufficientSignatures { signed: 0, .. })
        ));
    }

    #[test]
    fn test_round_without_roster() {
        let (_, history) = setup(1);
        let validator = SignedStateValidator::new(Arc::new(Ed25519Verifier));
        assert!(matches!(
            validator.validate(0, &[0u8; 32], &[], &history),
            Err(ReconnectError::NoRoster(0))
        ));
    }
}
