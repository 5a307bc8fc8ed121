//! Round-indexed pruning of ancient events
//!
//! The working set is keyed by hash; this index maps each birth round to the
//! hashes born in it so a window advance touches only the rounds that became
//! ancient instead of scanning every resident event.

use hgraph_core::{EventHash, Round};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Birth round -> hashes of resident events
#[derive(Debug, Default)]
pub struct RoundIndex {
    rounds: Mutex<BTreeMap<Round, Vec<EventHash>>>,
}

impl RoundIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, round: Round, hash: EventHash) {
        self.rounds.lock().entry(round).or_default().push(hash);
    }

    /// Remove and return every hash with birth round at or below `threshold`
    pub fn drain_through(&self, threshold: Round) -> Vec<EventHash> {
        let mut rounds = self.rounds.lock();
        let retained = rounds.split_off(&threshold.saturating_add(1));
        let drained = std::mem::replace(&mut *rounds, retained);
        drained.into_values().flatten().collect()
    }

    pub fn clear(&self) {
        self.rounds.lock().clear();
    }

    /// Lowest birth round still indexed
    pub fn oldest_round(&self) -> Option<Round> {
        self.rounds.lock().keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.rounds.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.lock().is_empty()
    }
}

/// Outcome of one pruning pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruningStats {
    /// Events removed from the working set
    pub pruned: usize,

    /// Events still resident afterwards
    pub remaining: usize,

    /// Ancient threshold the pass pruned through
    pub threshold: Round,
}
