//! Consensus snapshot and system transactions

use super::event::EventHash;
use super::node::{NodeId, Round};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of the consensus algorithm at the end of a round.
///
/// Carried inside the state so a reconnect or restart can resume consensus
/// exactly where the received state left off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusSnapshot {
    /// Last round that reached consensus
    pub round: Round,

    /// Judges of `round`
    pub judges: Vec<EventHash>,

    /// Consensus order number the next event will receive
    pub next_consensus_number: u64,

    /// Consensus timestamp of the last event in `round`
    pub consensus_timestamp: DateTime<Utc>,
}

impl ConsensusSnapshot {
    pub fn new(round: Round, consensus_timestamp: DateTime<Utc>) -> Self {
        Self {
            round,
            judges: Vec::new(),
            next_consensus_number: 0,
            consensus_timestamp,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

/// Transactions the platform itself embeds in events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemTransaction {
    /// A node's signature over the state hash of a round
    StateSignature {
        round: Round,
        state_hash: [u8; 32],
        signature: Vec<u8>,
    },

    /// A node announces it is leaving the network at `round`
    Departure { node_id: NodeId, round: Round },
}
