//! # Hgraph Reconnect Module
//!
//! Detects that this node has fallen behind the network and recovers by
//! pulling a verified state snapshot from a peer.
//!
//! ## Features
//!
//! - **Fallen-Behind Manager**: quorum over per-peer "you are behind" reports
//! - **State Tree**: fixed-depth Merkle tree supporting a structural diff
//! - **Signed State**: quorum-weight check of node signatures over a root hash
//! - **Learner / Teacher**: the two ends of the state transfer protocol
//! - **Controller**: teacher selection, retries, timeouts and stall signalling
//!
//! ## Module Structure
//!
//! ```text
//! reconnect/
//! ├── fallen_behind/     - Behind-report quorum
//! ├── state_tree/        - Merkle state tree
//! ├── signed_state/      - Signature quorum validation
//! ├── store/             - State data source
//! ├── protocol/          - Wire messages
//! ├── learner/           - Receiving side
//! ├── teacher/           - Sending side
//! ├── controller/        - Session orchestration
//! └── memory_transport/  - In-process transport
//! ```

pub mod controller;
pub mod error;
pub mod fallen_behind;
pub mod learner;
pub mod memory_transport;
pub mod metrics;
pub mod protocol;
pub mod signed_state;
pub mod state_tree;
pub mod store;
pub mod teacher;

pub use controller::{
    NoopReconnectListener, ReconnectConfig, ReconnectController, ReconnectListener,
    ReconnectOutcome, ReconnectState,
};
pub use error::{ReconnectError, Result};
pub use fallen_behind::{FallenBehindManager, QuorumMode};
pub use learner::{LearnedState, ReconnectLearner};
pub use memory_transport::{memory_pair, MemoryConnection, MemoryTransport, PeerHandler};
pub use metrics::ReconnectMetrics;
pub use protocol::ReconnectMessage;
pub use signed_state::{SignatureTally, SignedStateValidator};
pub use state_tree::{Bucket, StateTree};
pub use store::{InMemoryStateStore, SavedState, StateDataSource};
pub use teacher::{ReconnectTeacher, TeachingOutcome};
