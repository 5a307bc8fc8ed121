//! In-process transport
//!
//! Connects learners to teachers living in the same process over tokio
//! channels. Used by the node when running a local network and by tests.

use crate::teacher::{ReconnectTeacher, TeachingOutcome};
use async_trait::async_trait;
use dashmap::DashMap;
use hgraph_core::error::{CoreError, Result};
use hgraph_core::traits::{Connection, Transport};
use hgraph_core::NodeId;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// One end of an in-memory duplex connection
pub struct MemoryConnection {
    peer: NodeId,
    tx: Option<UnboundedSender<Vec<u8>>>,
    rx: UnboundedReceiver<Vec<u8>>,
}

/// Create a connected pair. The first end belongs to `a` and talks to `b`.
pub fn memory_pair(a: NodeId, b: NodeId) -> (MemoryConnection, MemoryConnection) {
    let (a_tx, b_rx) = unbounded_channel();
    let (b_tx, a_rx) = unbounded_channel();

    (
        MemoryConnection {
            peer: b,
            tx: Some(a_tx),
            rx: a_rx,
        },
        MemoryConnection {
            peer: a,
            tx: Some(b_tx),
            rx: b_rx,
        },
    )
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(CoreError::ConnectionClosed)?;
        tx.send(data.to_vec())
            .map_err(|_| CoreError::ConnectionClosed)
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        self.rx.recv().await.ok_or(CoreError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }

    fn peer_id(&self) -> NodeId {
        self.peer
    }
}

/// Accepts inbound in-memory connections
#[async_trait]
pub trait PeerHandler: Send + Sync {
    async fn handle(&self, conn: MemoryConnection);
}

#[async_trait]
impl PeerHandler for ReconnectTeacher {
    async fn handle(&self, mut conn: MemoryConnection) {
        let learner = conn.peer_id();
        match self.serve(&mut conn).await {
            Ok(TeachingOutcome::Taught { round, buckets_sent, .. }) => {
                debug!(learner = %learner, round, buckets_sent, "Teaching session finished");
            }
            Ok(TeachingOutcome::Declined { .. }) => {}
            Err(e) => warn!(learner = %learner, error = %e, "Teaching session failed"),
        }
        let _ = conn.close().await;
    }
}

/// Transport whose peers are handlers registered in this process
pub struct MemoryTransport {
    local: NodeId,
    peers: DashMap<NodeId, Arc<dyn PeerHandler>>,
}

impl MemoryTransport {
    pub fn new(local: NodeId) -> Self {
        Self {
            local,
            peers: DashMap::new(),
        }
    }

    pub fn add_peer(&self, node: NodeId, handler: Arc<dyn PeerHandler>) {
        self.peers.insert(node, handler);
    }

    pub fn remove_peer(&self, node: &NodeId) {
        self.peers.remove(node);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, peer: NodeId) -> Result<Box<dyn Connection>> {
        let handler = self
            .peers
            .get(&peer)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| CoreError::transport(format!("unknown peer {}", peer)))?;

        let (local, remote) = memory_pair(self.local, peer);
        tokio::spawn(async move {
            handler.handle(remote).await;
        });

        info!(peer = %peer, "Opened in-memory connection");
        Ok(Box::new(local))
    }

    fn local_node_id(&self) -> NodeId {
        self.local
    }
}
