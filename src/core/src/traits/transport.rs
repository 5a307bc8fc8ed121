//! Transport layer trait
//!
//! The gossip transport itself lives outside this workspace. Reconnect only
//! needs an ordered, framed byte stream to one peer.

use crate::error::Result;
use crate::types::NodeId;
use async_trait::async_trait;

/// Framed, ordered connection to a single peer
#[async_trait]
pub trait Connection: Send + Sync {
    /// Send one frame
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive the next frame
    async fn receive(&mut self) -> Result<Vec<u8>>;

    /// Close the connection
    async fn close(&mut self) -> Result<()>;

    /// Get the remote node ID
    fn peer_id(&self) -> NodeId;
}

/// Opens connections to peers
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to a peer
    async fn connect(&self, peer: NodeId) -> Result<Box<dyn Connection>>;

    /// Get local node ID
    fn local_node_id(&self) -> NodeId;
}
