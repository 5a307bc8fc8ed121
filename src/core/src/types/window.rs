//! Event window: the ancient threshold and the latest consensus round

use super::node::{Round, ROUND_UNDEFINED};
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current ancient threshold and consensus horizon.
///
/// An event is ancient iff its birth round is at or below
/// `ancient_threshold`. Windows only move forward except at a reconnect or
/// restart boundary, where the pipeline replaces the window wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWindow {
    latest_consensus_round: Round,
    ancient_threshold: Round,
}

impl EventWindow {
    /// Create a window, rejecting a threshold beyond the consensus round
    pub fn new(latest_consensus_round: Round, ancient_threshold: Round) -> Result<Self> {
        if ancient_threshold > latest_consensus_round {
            return Err(CoreError::InvalidEventWindow(format!(
                "ancient threshold {} exceeds latest consensus round {}",
                ancient_threshold, latest_consensus_round
            )));
        }
        Ok(Self {
            latest_consensus_round,
            ancient_threshold,
        })
    }

    /// Window before any round has reached consensus
    pub fn genesis() -> Self {
        Self {
            latest_consensus_round: ROUND_UNDEFINED,
            ancient_threshold: ROUND_UNDEFINED,
        }
    }

    /// Window derived from the latest consensus round, keeping
    /// `rounds_non_ancient` rounds alive
    pub fn from_latest_round(latest_consensus_round: Round, rounds_non_ancient: u64) -> Self {
        Self {
            latest_consensus_round,
            ancient_threshold: latest_consensus_round.saturating_sub(rounds_non_ancient),
        }
    }

    /// Window at a reconnect or restart boundary: everything up to and
    /// including `round` is ancient
    pub fn at_snapshot(round: Round) -> Self {
        Self {
            latest_consensus_round: round,
            ancient_threshold: round,
        }
    }

    pub fn latest_consensus_round(&self) -> Round {
        self.latest_consensus_round
    }

    pub fn ancient_threshold(&self) -> Round {
        self.ancient_threshold
    }

    /// Round new self events are born in
    pub fn pending_round(&self) -> Round {
        self.latest_consensus_round + 1
    }

    pub fn is_ancient(&self, birth_round: Round) -> bool {
        birth_round <= self.ancient_threshold
    }

    /// Check that `next` does not move either boundary backwards
    pub fn check_advance(&self, next: &EventWindow) -> Result<()> {
        if next.latest_consensus_round < self.latest_consensus_round
            || next.ancient_threshold < self.ancient_threshold
        {
            return Err(CoreError::InvalidEventWindow(format!(
                "window regression from {} to {}",
                self, next
            )));
        }
        Ok(())
    }
}

impl Default for EventWindow {
    fn default() -> Self {
        Self::genesis()
    }
}

impl fmt::Display for EventWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[consensus={} ancient<={}]",
            self.latest_consensus_round, self.ancient_threshold
        )
    }
}
