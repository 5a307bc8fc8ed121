//! Shared types for the intake and reconnect pipeline

pub mod event;
pub mod node;
pub mod roster;
pub mod snapshot;
pub mod window;

// Re-export commonly used types
pub use event::{Event, EventBuilder, EventDescriptor, EventHash};
pub use node::{NodeId, NodeSignature, Round, ROUND_FIRST, ROUND_UNDEFINED};
pub use roster::{Roster, RosterEntry, RosterHistory};
pub use snapshot::{ConsensusSnapshot, SystemTransaction};
pub use window::EventWindow;
