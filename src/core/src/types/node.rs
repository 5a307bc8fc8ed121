//! Node identity, rounds and node signatures

use serde::{Deserialize, Serialize};
use std::fmt;

/// Consensus round number
pub type Round = u64;

/// Round number used before any round exists
pub const ROUND_UNDEFINED: Round = 0;

/// First round of the network
pub const ROUND_FIRST: Round = 1;

/// Identity of a network member
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn new(id: u64) -> Self {
        NodeId(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        NodeId(id)
    }
}

/// A signature produced by a single node, ordered by node identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeSignature {
    pub node_id: NodeId,
    pub signature: Vec<u8>,
}

impl NodeSignature {
    pub fn new(node_id: NodeId, signature: Vec<u8>) -> Self {
        Self { node_id, signature }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_signature_ordering() {
        let mut sigs = vec![
            NodeSignature::new(NodeId(3), vec![1]),
            NodeSignature::new(NodeId(1), vec![9]),
            NodeSignature::new(NodeId(2), vec![5]),
        ];
        sigs.sort();

        let ids: Vec<u64> = sigs.iter().map(|s| s.node_id.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(7).to_string(), "node-7");
    }
}
