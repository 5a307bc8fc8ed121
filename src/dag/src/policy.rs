//! What the linker does when an event is structurally suspicious

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structural anomalies detected while linking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anomaly {
    /// A parent descriptor did not resolve in the working set
    MissingParent,

    /// A resolved parent's birth round differs from the descriptor's claim
    BirthRoundMismatch,

    /// The child was not created strictly after its self-parent
    TimeNotAfterSelfParent,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Anomaly::MissingParent => "missing_parent",
            Anomaly::BirthRoundMismatch => "birth_round_mismatch",
            Anomaly::TimeNotAfterSelfParent => "time_not_after_self_parent",
        };
        f.write_str(name)
    }
}

/// Reaction to an anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyAction {
    /// Link as observed
    Keep,
    /// Mark the parent slot severed and admit the event
    Sever,
    /// Drop the event
    Reject,
}

/// Per-anomaly actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyPolicy {
    #[serde(default = "default_missing_parent")]
    pub on_missing_parent: AnomalyAction,

    #[serde(default = "default_sever")]
    pub on_birth_round_mismatch: AnomalyAction,

    #[serde(default = "default_sever")]
    pub on_time_mismatch: AnomalyAction,
}

fn default_missing_parent() -> AnomalyAction {
    AnomalyAction::Keep
}

fn default_sever() -> AnomalyAction {
    AnomalyAction::Sever
}

impl Default for AnomalyPolicy {
    fn default() -> Self {
        Self {
            on_missing_parent: default_missing_parent(),
            on_birth_round_mismatch: default_sever(),
            on_time_mismatch: default_sever(),
        }
    }
}

impl AnomalyPolicy {
    /// Every anomaly is informational only
    pub fn permissive() -> Self {
        Self {
            on_missing_parent: AnomalyAction::Keep,
            on_birth_round_mismatch: AnomalyAction::Keep,
            on_time_mismatch: AnomalyAction::Keep,
        }
    }

    /// Every anomaly drops the event
    pub fn strict() -> Self {
        Self {
            on_missing_parent: AnomalyAction::Reject,
            on_birth_round_mismatch: AnomalyAction::Reject,
            on_time_mismatch: AnomalyAction::Reject,
        }
    }

    pub fn action_for(&self, anomaly: Anomaly) -> AnomalyAction {
        match anomaly {
            Anomaly::MissingParent => self.on_missing_parent,
            Anomaly::BirthRoundMismatch => self.on_birth_round_mismatch,
            Anomaly::TimeNotAfterSelfParent => self.on_time_mismatch,
        }
    }
}
