//! Reconnect wire protocol
//!
//! ```text
//! learner                          teacher
//!   Hello { learner, round }   ->
//!                              <-  Offer { round, root, depth, sigs } | Decline
//!   QueryNodes { indices }     ->
//!                              <-  NodeHashes { hashes }          (per level)
//!   RequestBuckets { leaves }  ->
//!                              <-  Buckets { buckets }
//!   Done                       ->
//! ```
//!
//! Every frame is one bincode-encoded [`ReconnectMessage`].

use crate::error::{ReconnectError, Result};
use hgraph_core::traits::Connection;
use hgraph_core::{NodeId, NodeSignature, Round};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;

/// Upper bound on node indices or leaves in a single request
pub const MAX_BATCH: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconnectMessage {
    Hello {
        learner: NodeId,
        local_round: Round,
    },
    Offer {
        round: Round,
        root_hash: [u8; 32],
        depth: u8,
        signatures: Vec<NodeSignature>,
    },
    Decline {
        reason: String,
    },
    QueryNodes {
        indices: Vec<u64>,
    },
    NodeHashes {
        hashes: Vec<[u8; 32]>,
    },
    RequestBuckets {
        leaves: Vec<u64>,
    },
    Buckets {
        buckets: Vec<(u64, Vec<(Vec<u8>, Vec<u8>)>)>,
    },
    Done,
    Abort {
        reason: String,
    },
}

impl ReconnectMessage {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(frame: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(frame)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ReconnectMessage::Hello { .. } => "hello",
            ReconnectMessage::Offer { .. } => "offer",
            ReconnectMessage::Decline { .. } => "decline",
            ReconnectMessage::QueryNodes { .. } => "query_nodes",
            ReconnectMessage::NodeHashes { .. } => "node_hashes",
            ReconnectMessage::RequestBuckets { .. } => "request_buckets",
            ReconnectMessage::Buckets { .. } => "buckets",
            ReconnectMessage::Done => "done",
            ReconnectMessage::Abort { .. } => "abort",
        }
    }
}

/// Send one message
pub async fn send_message(conn: &mut dyn Connection, message: &ReconnectMessage) -> Result<()> {
    let frame = message.encode()?;
    conn.send(&frame).await?;
    Ok(())
}

/// Receive one message, failing with [`ReconnectError::Timeout`] after `limit`
pub async fn receive_message(
    conn: &mut dyn Connection,
    limit: Duration,
) -> Result<ReconnectMessage> {
    let frame = timeout(limit, conn.receive())
        .await
        .map_err(|_| ReconnectError::Timeout)??;
    ReconnectMessage::decode(&frame)
}

/// Build a protocol error for a message arriving out of turn
pub fn unexpected(expected: &str, got: &ReconnectMessage) -> ReconnectError {
    ReconnectError::Protocol(format!("expected {}, got {}", expected, got.kind()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_frame_decodes() {
        let offer = ReconnectMessage::Offer {
            round: 12,
            root_hash: [3u8; 32],
            depth: 8,
            signatures: vec![NodeSignature {
                node_id: NodeId(4),
                signature: vec![1; 64],
            }],
        };
        let frame = offer.encode().unwrap();
        assert_eq!(ReconnectMessage::decode(&frame).unwrap(), offer);
    }

    #[test]
    fn test_garbage_frame_is_serialization_error() {
        assert!(matches!(
            ReconnectMessage::decode(&[0xff, 0xff, 0xff, 0xff, 0xff]),
            Err(ReconnectError::Serialization(_))
        ));
    }
}
