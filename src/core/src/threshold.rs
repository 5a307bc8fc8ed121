//! Quorum thresholds
//!
//! Both the fallen-behind decision and the signed-state check compare a
//! partial amount (peers or weight) against a whole. The comparison is
//! injected so deployments can choose count- or stake-based policies.

use serde::{Deserialize, Serialize};

/// Decides whether `part` out of `whole` is enough
pub trait QuorumThreshold: Send + Sync {
    fn is_met(&self, part: u64, whole: u64) -> bool;
}

impl<F> QuorumThreshold for F
where
    F: Fn(u64, u64) -> bool + Send + Sync,
{
    fn is_met(&self, part: u64, whole: u64) -> bool {
        self(part, whole)
    }
}

/// Standard BFT thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threshold {
    /// At least one third: guarantees one honest participant
    StrongMinority,
    /// More than one half
    Majority,
    /// More than two thirds
    SuperMajority,
}

impl QuorumThreshold for Threshold {
    fn is_met(&self, part: u64, whole: u64) -> bool {
        // u128 so large stake totals cannot overflow
        let part = part as u128;
        let whole = whole as u128;
        match self {
            Threshold::StrongMinority => 3 * part >= whole,
            Threshold::Majority => 2 * part > whole,
            Threshold::SuperMajority => 3 * part > 2 * whole,
        }
    }
}

/// Met once `part` strictly exceeds `fraction * whole`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractionThreshold(pub f64);

impl QuorumThreshold for FractionThreshold {
    fn is_met(&self, part: u64, whole: u64) -> bool {
        if whole == 0 {
            return false;
        }
        part as f64 > self.0 * whole as f64
    }
}
