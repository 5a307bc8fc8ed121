//! Membership rosters and their round-indexed history

use super::node::{NodeId, Round};
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A single roster member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub node_id: NodeId,

    /// Ed25519 verifying key bytes
    pub public_key: Vec<u8>,

    /// Voting weight (stake)
    pub weight: u64,
}

impl RosterEntry {
    pub fn new(node_id: NodeId, public_key: Vec<u8>, weight: u64) -> Self {
        Self {
            node_id,
            public_key,
            weight,
        }
    }
}

/// Set of members active for a range of rounds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    entries: BTreeMap<NodeId, RosterEntry>,
}

impl Roster {
    pub fn new(entries: impl IntoIterator<Item = RosterEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.node_id, e)).collect(),
        }
    }

    pub fn get(&self, node_id: &NodeId) -> Option<&RosterEntry> {
        self.entries.get(node_id)
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.entries.contains_key(node_id)
    }

    /// Weight of a member, zero for non-members
    pub fn weight_of(&self, node_id: &NodeId) -> u64 {
        self.entries.get(node_id).map(|e| e.weight).unwrap_or(0)
    }

    pub fn total_weight(&self) -> u64 {
        self.entries
            .values()
            .fold(0u64, |total, e| total.saturating_add(e.weight))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.values()
    }
}

/// Versioned sequence of (starting round, roster) pairs.
///
/// Immutable once built; a roster change replaces the whole history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterHistory {
    version: u64,
    /// Sorted by starting round, strictly increasing
    rosters: Vec<(Round, Arc<Roster>)>,
}

impl RosterHistory {
    pub fn new(version: u64, rosters: Vec<(Round, Roster)>) -> Result<Self> {
        if rosters.is_empty() {
            return Err(CoreError::InvalidRosterHistory(
                "roster history must contain at least one roster".to_string(),
            ));
        }

        for pair in rosters.windows(2) {
            if pair[0].0 >= pair[1].0 {
                return Err(CoreError::InvalidRosterHistory(format!(
                    "starting rounds must increase strictly ({} then {})",
                    pair[0].0, pair[1].0
                )));
            }
        }

        Ok(Self {
            version,
            rosters: rosters
                .into_iter()
                .map(|(round, roster)| (round, Arc::new(roster)))
                .collect(),
        })
    }

    /// History with one roster valid from `start_round` onward
    pub fn single(version: u64, start_round: Round, roster: Roster) -> Self {
        Self {
            version,
            rosters: vec![(start_round, Arc::new(roster))],
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Roster covering `round`, if any
    pub fn roster_for_round(&self, round: Round) -> Option<&Arc<Roster>> {
        let idx = self.rosters.partition_point(|(start, _)| *start <= round);
        if idx == 0 {
            return None;
        }
        Some(&self.rosters[idx - 1].1)
    }

    /// Most recent roster
    pub fn current(&self) -> &Arc<Roster> {
        // Non-empty by construction
        &self.rosters[self.rosters.len() - 1].1
    }

    pub fn len(&self) -> usize {
        self.rosters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rosters.is_empty()
    }
}
