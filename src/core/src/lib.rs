//! # Hgraph Core
//!
//! Shared types, traits, and error handling for the event-intake and
//! reconnect pipeline. Every other crate in the workspace depends on this one,
//! so it stays free of networking, storage and metrics concerns.

pub mod error;
pub mod threshold;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use threshold::{FractionThreshold, QuorumThreshold, Threshold};
pub use types::{
    ConsensusSnapshot, Event, EventBuilder, EventDescriptor, EventHash, EventWindow, NodeId,
    NodeSignature, Roster, RosterEntry, RosterHistory, Round, SystemTransaction, ROUND_FIRST,
    ROUND_UNDEFINED,
};
