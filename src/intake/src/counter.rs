//! Per-peer intake tallies
//!
//! The gossip scheduler asks [`IntakeEventCounter::has_unprocessed`] before
//! fetching more from a peer, so one peer cannot flood the pipeline while its
//! previous batch is still draining.

use dashmap::DashMap;
use hgraph_core::NodeId;
use prometheus::IntCounter;
use tracing::error;

/// Tracks events that entered the pipeline but have not left it
pub trait IntakeEventCounter: Send + Sync {
    /// An event from `peer` entered the pipeline
    fn enter(&self, peer: NodeId);

    /// An event from `peer` left the pipeline (accepted, dropped or ancient)
    fn exit(&self, peer: NodeId);

    fn has_unprocessed(&self, peer: &NodeId) -> bool;

    fn count(&self, peer: &NodeId) -> u64;

    /// Zero every tally
    fn reset(&self);
}

/// Lock-sharded tally map
#[derive(Default)]
pub struct DefaultIntakeEventCounter {
    tallies: DashMap<NodeId, u64>,
    underflow: Option<IntCounter>,
}

impl DefaultIntakeEventCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count unmatched exits into `counter`
    pub fn with_underflow_counter(mut self, counter: IntCounter) -> Self {
        self.underflow = Some(counter);
        self
    }

    /// Sum across all peers
    pub fn total(&self) -> u64 {
        self.tallies.iter().map(|entry| *entry.value()).sum()
    }
}

impl IntakeEventCounter for DefaultIntakeEventCounter {
    fn enter(&self, peer: NodeId) {
        *self.tallies.entry(peer).or_insert(0) += 1;
    }

    fn exit(&self, peer: NodeId) {
        let decremented = match self.tallies.get_mut(&peer) {
            Some(mut tally) if *tally > 0 => {
                *tally -= 1;
                true
            }
            _ => false,
        };

        if decremented {
            self.tallies.remove_if(&peer, |_, tally| *tally == 0);
            return;
        }

        error!(peer = %peer, "Intake counter exit without a matching enter");
        if let Some(underflow) = &self.underflow {
            underflow.inc();
        }
    }

    fn has_unprocessed(&self, peer: &NodeId) -> bool {
        self.count(peer) > 0
    }

    fn count(&self, peer: &NodeId) -> u64 {
        self.tallies.get(peer).map(|tally| *tally).unwrap_or(0)
    }

    fn reset(&self) {
        self.tallies.clear();
    }
}

/// Counter for configurations with intake flow control disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpIntakeEventCounter;

impl IntakeEventCounter for NoOpIntakeEventCounter {
    fn enter(&self, _peer: NodeId) {}

    fn exit(&self, _peer: NodeId) {}

    fn has_unprocessed(&self, _peer: &NodeId) -> bool {
        false
    }

    fn count(&self, _peer: &NodeId) -> u64 {
        0
    }

    fn reset(&self) {}
}
