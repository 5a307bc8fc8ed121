//! Learner side of reconnect
//!
//! Pulls the teacher's state into a working copy by walking both trees level
//! by level and fetching only the leaves that differ. Every received level is
//! checked against the parent hashes already trusted, so a lying teacher is
//! caught at the first level it lies about. Nothing is committed until the
//! full root matches the signed root and the embedded snapshot is for the
//! offered round.

use crate::error::{ReconnectError, Result};
use crate::protocol::{receive_message, send_message, unexpected, ReconnectMessage, MAX_BATCH};
use crate::signed_state::SignedStateValidator;
use crate::state_tree::{Bucket, StateTree};
use crate::store::StateDataSource;
use hgraph_core::traits::Connection;
use hgraph_core::{ConsensusSnapshot, NodeId, RosterHistory};
use hgraph_crypto::hash::hash_pair;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// State obtained by a successful session
#[derive(Debug, Clone)]
pub struct LearnedState {
    pub teacher: NodeId,
    pub snapshot: ConsensusSnapshot,
    pub root_hash: [u8; 32],
    pub buckets_transferred: usize,
}

/// Receives state from one teacher
pub struct ReconnectLearner {
    node_id: NodeId,
    store: Arc<dyn StateDataSource>,
    validator: Arc<SignedStateValidator>,
    roster_history: Arc<RosterHistory>,
    socket_timeout: Duration,
}

impl ReconnectLearner {
    pub fn new(
        node_id: NodeId,
        store: Arc<dyn StateDataSource>,
        validator: Arc<SignedStateValidator>,
        roster_history: Arc<RosterHistory>,
        socket_timeout: Duration,
    ) -> Self {
        Self {
            node_id,
            store,
            validator,
            roster_history,
            socket_timeout,
        }
    }

    /// Run one session against the teacher at the other end of `conn`
    pub async fn run(&self, conn: &mut dyn Connection) -> Result<LearnedState> {
        let teacher = conn.peer_id();
        let mut working = self.store.working_copy()?;
        let local_round = working.snapshot_round()?;

        send_message(
            conn,
            &ReconnectMessage::Hello {
                learner: self.node_id,
                local_round,
            },
        )
        .await?;

        let (round, root_hash, depth, signatures) =
            match receive_message(conn, self.socket_timeout).await? {
                ReconnectMessage::Offer {
                    round,
                    root_hash,
                    depth,
                    signatures,
                } => (round, root_hash, depth, signatures),
                ReconnectMessage::Decline { reason } => {
                    return Err(ReconnectError::Declined { teacher, reason })
                }
                other => return Err(unexpected("offer", &other)),
            };

        // Never roll the store back to a state at or before the one it holds
        if round <= local_round {
            let reason = format!("offered round {} is not ahead of {}", round, local_round);
            if let Err(e) = send_message(conn, &ReconnectMessage::Abort { reason }).await {
                debug!(teacher = %teacher, error = %e, "Could not abort stale offer");
            }
            return Err(ReconnectError::StaleOffer {
                offered: round,
                local: local_round,
            });
        }

        if depth != working.depth() {
            return Err(ReconnectError::Protocol(format!(
                "teacher tree depth {} differs from local depth {}",
                depth,
                working.depth()
            )));
        }

        // Reject an unsigned state before transferring anything
        let tally = self
            .validator
            .validate(round, &root_hash, &signatures, &self.roster_history)?;
        debug!(
            teacher = %teacher,
            round,
            signed_weight = tally.signed_weight,
            total_weight = tally.total_weight,
            "Offered state is sufficiently signed"
        );

        let differing_leaves = self.diff(conn, &working, root_hash).await?;
        let buckets_transferred = differing_leaves.len();

        for chunk in differing_leaves.chunks(MAX_BATCH) {
            let leaves: Vec<u64> = chunk.iter().map(|l| *l as u64).collect();
            let buckets = match self
                .request(conn, ReconnectMessage::RequestBuckets { leaves })
                .await?
            {
                ReconnectMessage::Buckets { buckets } => buckets,
                other => return Err(unexpected("buckets", &other)),
            };
            if buckets.len() != chunk.len() {
                return Err(ReconnectError::Protocol(format!(
                    "requested {} buckets, received {}",
                    chunk.len(),
                    buckets.len()
                )));
            }

            for ((leaf, entries), requested) in buckets.into_iter().zip(chunk) {
                if leaf as usize != *requested {
                    return Err(ReconnectError::Protocol(format!(
                        "received leaf {} in place of {}",
                        leaf, requested
                    )));
                }
                let bucket: Bucket = entries.into_iter().collect();
                working.set_bucket(*requested, bucket)?;
            }
        }

        send_message(conn, &ReconnectMessage::Done).await?;

        if working.root_hash() != root_hash {
            return Err(ReconnectError::RootMismatch {
                expected: hex_prefix(&root_hash),
                actual: hex_prefix(&working.root_hash()),
            });
        }

        let snapshot = working
            .snapshot()?
            .ok_or_else(|| ReconnectError::Protocol("received state has no snapshot".into()))?;
        if snapshot.round != round {
            return Err(ReconnectError::SnapshotRoundMismatch {
                expected: round,
                actual: snapshot.round,
            });
        }

        self.store
            .commit(working, signatures)
            .map_err(|e| ReconnectError::Store(e.to_string()))?;

        info!(
            teacher = %teacher,
            round,
            buckets_transferred,
            "Reconnect state received and committed"
        );

        Ok(LearnedState {
            teacher,
            snapshot,
            root_hash,
            buckets_transferred,
        })
    }

    /// Walk the tree top-down and return leaf numbers whose hash differs
    async fn diff(
        &self,
        conn: &mut dyn Connection,
        local: &StateTree,
        root_hash: [u8; 32],
    ) -> Result<Vec<usize>> {
        if local.root_hash() == root_hash {
            return Ok(Vec::new());
        }

        // (heap index, hash the teacher committed to for it)
        let mut frontier: Vec<(usize, [u8; 32])> = vec![(0, root_hash)];

        while !local.is_leaf_index(frontier[0].0) {
            let indices: Vec<u64> = frontier
                .iter()
                .flat_map(|(index, _)| {
                    let (left, right) = StateTree::children(*index);
                    [left as u64, right as u64]
                })
                .collect();

            // Siblings stay in one chunk since MAX_BATCH is even
            let mut hashes = Vec::with_capacity(indices.len());
            for chunk in indices.chunks(MAX_BATCH) {
                let query = ReconnectMessage::QueryNodes {
                    indices: chunk.to_vec(),
                };
                let received = match self.request(conn, query).await? {
                    ReconnectMessage::NodeHashes { hashes } => hashes,
                    other => return Err(unexpected("node_hashes", &other)),
                };
                if received.len() != chunk.len() {
                    return Err(ReconnectError::Protocol(format!(
                        "queried {} nodes, received {}",
                        chunk.len(),
                        received.len()
                    )));
                }
                hashes.extend(received);
            }

            let mut next = Vec::new();
            for ((parent, expected), pair) in frontier.iter().zip(hashes.chunks(2)) {
                if hash_pair(&pair[0], &pair[1]) != *expected {
                    return Err(ReconnectError::RootMismatch {
                        expected: hex_prefix(expected),
                        actual: format!("children of node {}", parent),
                    });
                }

                let (left, right) = StateTree::children(*parent);
                for (index, hash) in [(left, pair[0]), (right, pair[1])] {
                    if local.node_hash(index) != Some(hash) {
                        next.push((index, hash));
                    }
                }
            }

            debug!(level_nodes = indices.len(), differing = next.len(), "Diffed tree level");
            if next.is_empty() {
                return Ok(Vec::new());
            }
            frontier = next;
        }

        let first_leaf = local.first_leaf_index();
        Ok(frontier.into_iter().map(|(index, _)| index - first_leaf).collect())
    }

    /// Send one request and wait for its reply, surfacing a teacher abort
    async fn request(
        &self,
        conn: &mut dyn Connection,
        message: ReconnectMessage,
    ) -> Result<ReconnectMessage> {
        send_message(conn, &message).await?;
        match receive_message(conn, self.socket_timeout).await? {
            ReconnectMessage::Abort { reason } => Err(ReconnectError::Protocol(format!(
                "teacher aborted: {}",
                reason
            ))),
            reply => Ok(reply),
        }
    }
}

fn hex_prefix(hash: &[u8; 32]) -> String {
    hex::encode(&hash[..8])
}
