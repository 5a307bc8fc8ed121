//! Teacher side of reconnect
//!
//! Serves the committed state of this node to a learner that asked for it.

use crate::error::{ReconnectError, Result};
use crate::protocol::{receive_message, send_message, unexpected, ReconnectMessage, MAX_BATCH};
use crate::store::StateDataSource;
use hgraph_core::traits::Connection;
use hgraph_core::{NodeId, Round};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a teaching session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeachingOutcome {
    /// The learner was not behind us
    Declined { learner: NodeId },

    /// State was served until the learner said done
    Taught {
        learner: NodeId,
        round: Round,
        buckets_sent: usize,
    },
}

/// Serves committed state to learners
pub struct ReconnectTeacher {
    node_id: NodeId,
    store: Arc<dyn StateDataSource>,
    socket_timeout: Duration,
}

impl ReconnectTeacher {
    pub fn new(node_id: NodeId, store: Arc<dyn StateDataSource>, socket_timeout: Duration) -> Self {
        Self {
            node_id,
            store,
            socket_timeout,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Run one teaching session over `conn`
    pub async fn serve(&self, conn: &mut dyn Connection) -> Result<TeachingOutcome> {
        let (learner, learner_round) = match receive_message(conn, self.socket_timeout).await? {
            ReconnectMessage::Hello {
                learner,
                local_round,
            } => (learner, local_round),
            other => return Err(unexpected("hello", &other)),
        };

        // Pin one committed state for the whole session
        let state = self.store.snapshot()?;
        let round = state.tree.snapshot_round()?;

        if round <= learner_round {
            info!(
                learner = %learner,
                learner_round,
                round,
                "Declining reconnect: learner is not behind"
            );
            let reason = format!("teacher round {} is not ahead of {}", round, learner_round);
            send_message(conn, &ReconnectMessage::Decline { reason }).await?;
            return Ok(TeachingOutcome::Declined { learner });
        }

        let tree = state.tree;
        info!(learner = %learner, learner_round, round, "Teaching state");
        send_message(
            conn,
            &ReconnectMessage::Offer {
                round,
                root_hash: tree.root_hash(),
                depth: tree.depth(),
                signatures: state.signatures,
            },
        )
        .await?;

        let mut buckets_sent = 0;
        loop {
            match receive_message(conn, self.socket_timeout).await? {
                ReconnectMessage::QueryNodes { indices } => {
                    if let Some(reason) = oversized(indices.len()) {
                        return self.abort(conn, reason).await;
                    }
                    let mut hashes = Vec::with_capacity(indices.len());
                    for index in indices {
                        match tree.node_hash(index as usize) {
                            Some(hash) => hashes.push(hash),
                            None => return self.abort(conn, format!("no node {}", index)).await,
                        }
                    }
                    send_message(conn, &ReconnectMessage::NodeHashes { hashes }).await?;
                }
                ReconnectMessage::RequestBuckets { leaves } => {
                    if let Some(reason) = oversized(leaves.len()) {
                        return self.abort(conn, reason).await;
                    }
                    let mut buckets = Vec::with_capacity(leaves.len());
                    for leaf in leaves {
                        match tree.bucket(leaf as usize) {
                            Some(bucket) => buckets.push((
                                leaf,
                                bucket.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                            )),
                            None => return self.abort(conn, format!("no leaf {}", leaf)).await,
                        }
                    }
                    buckets_sent += buckets.len();
                    debug!(learner = %learner, count = buckets.len(), "Sending buckets");
                    send_message(conn, &ReconnectMessage::Buckets { buckets }).await?;
                }
                ReconnectMessage::Done => break,
                ReconnectMessage::Abort { reason } => {
                    warn!(learner = %learner, reason = %reason, "Learner aborted reconnect");
                    return Err(ReconnectError::Protocol(format!("learner aborted: {}", reason)));
                }
                other => return Err(unexpected("query_nodes, request_buckets or done", &other)),
            }
        }

        info!(learner = %learner, round, buckets_sent, "Teaching complete");
        Ok(TeachingOutcome::Taught {
            learner,
            round,
            buckets_sent,
        })
    }

    async fn abort(&self, conn: &mut dyn Connection, reason: String) -> Result<TeachingOutcome> {
        warn!(reason = %reason, "Aborting teaching session");
        send_message(
            conn,
            &ReconnectMessage::Abort {
                reason: reason.clone(),
            },
        )
        .await?;
        Err(ReconnectError::Protocol(reason))
    }
}

fn oversized(len: usize) -> Option<String> {
    (len > MAX_BATCH).then(|| format!("batch of {} exceeds limit {}", len, MAX_BATCH))
}
