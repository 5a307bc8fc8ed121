//! Application callback surface
//!
//! Hooks the host application supplies. The pipeline invokes them
//! synchronously and never waits on them for correctness; a host that needs
//! slow work must hand it off to its own executor.

use crate::error::Result;
use crate::types::{ConsensusSnapshot, Event, SystemTransaction};

/// Extension points invoked by the pipeline
pub trait ApplicationCallbacks: Send + Sync {
    /// An event became causally ready, delivered in topological order
    fn on_preconsensus_event(&self, _event: &Event) {}

    /// The consensus snapshot was overridden at a reconnect or restart boundary
    fn on_snapshot_override(&self, _snapshot: &ConsensusSnapshot) {}

    /// A self-created event became ancient without reaching consensus
    fn on_stale_event(&self, _event: &Event) {}

    /// Encode a system transaction into the payload form embedded in events
    fn encode_system_transaction(&self, tx: &SystemTransaction) -> Result<Vec<u8>> {
        Ok(bincode::serialize(tx)?)
    }
}

/// Callbacks that ignore every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl ApplicationCallbacks for NoopCallbacks {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_encoder_is_bincode() {
        let tx = SystemTransaction::StateSignature {
            round: 5,
            state_hash: [1u8; 32],
            signature: vec![2u8; 64],
        };

        let encoded = NoopCallbacks.encode_system_transaction(&tx).unwrap();
        let decoded: SystemTransaction = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, tx);
    }
}
