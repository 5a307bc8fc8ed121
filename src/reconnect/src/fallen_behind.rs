//! Fallen-behind detection
//!
//! Peers tell us during gossip that we are behind. One report is not enough:
//! a single mistaken peer must not force a reconnect, so the decision is a
//! quorum over distinct reporters drawn from the current peer universe.
//!
//! Reporter set and universe live behind one lock so membership changes and
//! resets are totally ordered with concurrent reports.

use hgraph_core::{FractionThreshold, NodeId, QuorumThreshold};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// What the quorum counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuorumMode {
    /// Distinct reporting peers out of all tracked peers
    #[default]
    PeerCount,
    /// Reporting peers' weight out of the total tracked weight
    Weight,
}

#[derive(Debug, Default)]
struct FallenBehindState {
    /// Tracked peers and their weights
    universe: BTreeMap<NodeId, u64>,
    /// Peers that reported us behind since the last reset
    reporters: BTreeSet<NodeId>,
}

impl FallenBehindState {
    fn reported_weight(&self) -> u64 {
        self.reporters
            .iter()
            .filter_map(|peer| self.universe.get(peer))
            .fold(0u64, |total, w| total.saturating_add(*w))
    }

    fn total_weight(&self) -> u64 {
        self.universe
            .values()
            .fold(0u64, |total, w| total.saturating_add(*w))
    }
}

/// Aggregates behind-reports into a reconnect decision
pub struct FallenBehindManager {
    self_id: NodeId,
    state: RwLock<FallenBehindState>,
    threshold: Arc<dyn QuorumThreshold>,
    mode: QuorumMode,
    min_reporters: usize,
}

impl FallenBehindManager {
    /// Manager with a strict-majority peer-count quorum
    pub fn new(self_id: NodeId, peers: impl IntoIterator<Item = (NodeId, u64)>) -> Self {
        Self::with_threshold(
            self_id,
            peers,
            Arc::new(FractionThreshold(0.5)),
            QuorumMode::PeerCount,
        )
    }

    pub fn with_threshold(
        self_id: NodeId,
        peers: impl IntoIterator<Item = (NodeId, u64)>,
        threshold: Arc<dyn QuorumThreshold>,
        mode: QuorumMode,
    ) -> Self {
        let universe = peers
            .into_iter()
            .filter(|(peer, _)| *peer != self_id)
            .collect();

        Self {
            self_id,
            state: RwLock::new(FallenBehindState {
                universe,
                reporters: BTreeSet::new(),
            }),
            threshold,
            mode,
            min_reporters: 1,
        }
    }

    /// Require at least `min` distinct reporters regardless of the threshold
    pub fn with_min_reporters(mut self, min: usize) -> Self {
        self.min_reporters = min.max(1);
        self
    }

    /// Record that `peer` says we are behind.
    ///
    /// Returns true if the report was new. Reports from peers outside the
    /// tracked universe are ignored.
    pub fn report_behind(&self, peer: NodeId) -> bool {
        let mut state = self.state.write();

        if !state.universe.contains_key(&peer) {
            debug!(peer = %peer, "Ignoring behind report from untracked peer");
            return false;
        }

        let was_behind = self.quorum_met(&state);
        let inserted = state.reporters.insert(peer);

        if inserted {
            debug!(peer = %peer, reporters = state.reporters.len(), "Peer reports us behind");
            if !was_behind && self.quorum_met(&state) {
                info!(
                    node = %self.self_id,
                    reporters = state.reporters.len(),
                    peers = state.universe.len(),
                    "Fallen behind quorum reached"
                );
            }
        }
        inserted
    }

    /// Forget every report
    pub fn reset(&self) {
        let mut state = self.state.write();
        if !state.reporters.is_empty() {
            debug!(cleared = state.reporters.len(), "Fallen behind reports reset");
        }
        state.reporters.clear();
    }

    pub fn has_fallen_behind(&self) -> bool {
        self.quorum_met(&self.state.read())
    }

    pub fn num_reported(&self) -> usize {
        self.state.read().reporters.len()
    }

    /// Number of tracked peers
    pub fn num_peers(&self) -> usize {
        self.state.read().universe.len()
    }

    pub fn reported_weight(&self) -> u64 {
        self.state.read().reported_weight()
    }

    /// Whether `peer` may serve as our reconnect teacher
    pub fn should_reconnect_from(&self, peer: &NodeId) -> bool {
        let state = self.state.read();
        state.universe.contains_key(peer) && state.reporters.contains(peer)
    }

    /// Every peer `should_reconnect_from` accepts, in id order
    pub fn reconnect_candidates(&self) -> Vec<NodeId> {
        let state = self.state.read();
        state
            .reporters
            .iter()
            .filter(|peer| state.universe.contains_key(peer))
            .copied()
            .collect()
    }

    /// Apply a membership change. Removed peers lose any report they made.
    pub fn add_remove_peers(&self, added: &[(NodeId, u64)], removed: &[NodeId]) {
        let mut state = self.state.write();

        for (peer, weight) in added {
            if *peer != self.self_id {
                state.universe.insert(*peer, *weight);
            }
        }

        let mut purged = 0;
        for peer in removed {
            state.universe.remove(peer);
            if state.reporters.remove(peer) {
                purged += 1;
            }
        }

        info!(
            added = added.len(),
            removed = removed.len(),
            purged_reports = purged,
            peers = state.universe.len(),
            "Fallen behind peer set updated"
        );
    }

    fn quorum_met(&self, state: &FallenBehindState) -> bool {
        if state.reporters.len() < self.min_reporters {
            return false;
        }

        match self.mode {
            QuorumMode::PeerCount => self
                .threshold
                .is_met(state.reporters.len() as u64, state.universe.len() as u64),
            QuorumMode::Weight => self
                .threshold
                .is_met(state.reported_weight(), state.total_weight()),
        }
    }
}
