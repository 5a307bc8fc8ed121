//! Node configuration loading and validation

use anyhow::{Context, Result};
use hgraph_core::{CoreError, FractionThreshold, NodeId, QuorumThreshold, Threshold};
use hgraph_dag::AnomalyPolicy;
use hgraph_reconnect::{QuorumMode, ReconnectConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Complete node configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    pub node: NodeSection,

    #[serde(default)]
    pub intake: IntakeSection,

    #[serde(default)]
    pub linker: AnomalyPolicy,

    #[serde(default)]
    pub fallen_behind: FallenBehindSection,

    #[serde(default)]
    pub reconnect: ReconnectSection,

    #[serde(default)]
    pub metrics: MetricsSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeSection {
    pub id: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntakeSection {
    /// False selects the no-op intake counter
    #[serde(default = "default_true")]
    pub counter_enabled: bool,
    #[serde(default = "default_rounds_non_ancient")]
    pub rounds_non_ancient: u64,
    /// Callbacks slower than this are logged
    #[serde(default = "default_callback_budget")]
    pub callback_budget_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FallenBehindSection {
    #[serde(default = "default_threshold_fraction")]
    pub threshold_fraction: f64,
    #[serde(default)]
    pub weighted: bool,
    #[serde(default)]
    pub min_reporters: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconnectSection {
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_ms: u64,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_ms: u64,
    #[serde(default = "default_teacher_cooldown")]
    pub teacher_cooldown_secs: u64,
    #[serde(default = "default_state_tree_depth")]
    pub state_tree_depth: u8,
    #[serde(default = "default_signature_threshold")]
    pub signature_threshold: Threshold,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsSection {
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for IntakeSection {
    fn default() -> Self {
        Self {
            counter_enabled: true,
            rounds_non_ancient: default_rounds_non_ancient(),
            callback_budget_ms: default_callback_budget(),
        }
    }
}

impl Default for FallenBehindSection {
    fn default() -> Self {
        Self {
            threshold_fraction: default_threshold_fraction(),
            weighted: false,
            min_reporters: None,
        }
    }
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            socket_timeout_ms: default_socket_timeout(),
            session_timeout_ms: default_session_timeout(),
            teacher_cooldown_secs: default_teacher_cooldown(),
            state_tree_depth: default_state_tree_depth(),
            signature_threshold: default_signature_threshold(),
        }
    }
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
        }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_rounds_non_ancient() -> u64 { 26 }
fn default_callback_budget() -> u64 { 50 }
fn default_threshold_fraction() -> f64 { 0.5 }
fn default_socket_timeout() -> u64 { 5000 }
fn default_session_timeout() -> u64 { 60000 }
fn default_teacher_cooldown() -> u64 { 60 }
fn default_state_tree_depth() -> u8 { 8 }
fn default_signature_threshold() -> Threshold { Threshold::StrongMinority }
fn default_namespace() -> String { "hgraph".to_string() }

impl NodeConfig {
    /// Configuration with every section defaulted
    pub fn for_node(id: u64) -> Self {
        Self {
            node: NodeSection {
                id,
                log_level: default_log_level(),
            },
            intake: IntakeSection::default(),
            linker: AnomalyPolicy::default(),
            fallen_behind: FallenBehindSection::default(),
            reconnect: ReconnectSection::default(),
            metrics: MetricsSection::default(),
        }
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read configuration file {:?}", path.as_ref()))?;
        Self::parse(&contents)
    }

    /// Parse and validate TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: NodeConfig =
            toml::from_str(contents).context("Failed to parse configuration file")?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> hgraph_core::Result<()> {
        if self.intake.rounds_non_ancient == 0 {
            return Err(CoreError::configuration(
                "intake.rounds_non_ancient must be at least 1",
            ));
        }

        let fraction = self.fallen_behind.threshold_fraction;
        if !(0.0..1.0).contains(&fraction) {
            return Err(CoreError::configuration(format!(
                "fallen_behind.threshold_fraction must be in [0, 1), got {}",
                fraction
            )));
        }

        if self.reconnect.socket_timeout_ms == 0 || self.reconnect.session_timeout_ms == 0 {
            return Err(CoreError::configuration("reconnect timeouts must be non-zero"));
        }
        if self.reconnect.session_timeout_ms < self.reconnect.socket_timeout_ms {
            return Err(CoreError::configuration(
                "reconnect.session_timeout_ms must not be below socket_timeout_ms",
            ));
        }

        let depth = self.reconnect.state_tree_depth;
        if depth == 0 || depth > hgraph_reconnect::state_tree::MAX_DEPTH {
            return Err(CoreError::configuration(format!(
                "reconnect.state_tree_depth must be between 1 and {}, got {}",
                hgraph_reconnect::state_tree::MAX_DEPTH,
                depth
            )));
        }

        if self.metrics.namespace.is_empty() {
            return Err(CoreError::configuration("metrics.namespace must not be empty"));
        }

        Ok(())
    }

    pub fn node_id(&self) -> NodeId {
        NodeId(self.node.id)
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            socket_timeout: Duration::from_millis(self.reconnect.socket_timeout_ms),
            session_timeout: Duration::from_millis(self.reconnect.session_timeout_ms),
            teacher_cooldown: Duration::from_secs(self.reconnect.teacher_cooldown_secs),
        }
    }

    pub fn fallen_behind_threshold(&self) -> Arc<dyn QuorumThreshold> {
        Arc::new(FractionThreshold(self.fallen_behind.threshold_fraction))
    }

    pub fn fallen_behind_mode(&self) -> QuorumMode {
        if self.fallen_behind.weighted {
            QuorumMode::Weight
        } else {
            QuorumMode::PeerCount
        }
    }

    pub fn callback_budget(&self) -> Duration {
        Duration::from_millis(self.intake.callback_budget_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgraph_dag::AnomalyAction;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = NodeConfig::parse("[node]\nid = 3\n").unwrap();

        assert_eq!(config.node_id(), NodeId(3));
        assert_eq!(config.node.log_level, "info");
        assert!(config.intake.counter_enabled);
        assert_eq!(config.intake.rounds_non_ancient, 26);
        assert_eq!(config.linker, AnomalyPolicy::default());
        assert_eq!(config.fallen_behind_mode(), QuorumMode::PeerCount);
        assert_eq!(config.reconnect.signature_threshold, Threshold::StrongMinority);
        assert_eq!(config.reconnect_config().socket_timeout, Duration::from_secs(5));
        assert_eq!(config.metrics.namespace, "hgraph");
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
            [node]
            id = 7
            log_level = "debug"

            [intake]
            counter_enabled = false
            rounds_non_ancient = 10

            [linker]
            on_missing_parent = "reject"

            [fallen_behind]
            threshold_fraction = 0.33
            weighted = true
            min_reporters = 2

            [reconnect]
            socket_timeout_ms = 1000
            session_timeout_ms = 10000
            state_tree_depth = 12
            signature_threshold = "super_majority"

            [metrics]
            namespace = "node7"
        "#;

        let config = NodeConfig::parse(toml).unwrap();
        assert!(!config.intake.counter_enabled);
        assert_eq!(config.linker.on_missing_parent, AnomalyAction::Reject);
        assert_eq!(config.linker.on_time_mismatch, AnomalyAction::Sever);
        assert_eq!(config.fallen_behind.min_reporters, Some(2));
        assert_eq!(config.fallen_behind_mode(), QuorumMode::Weight);
        assert_eq!(config.reconnect.state_tree_depth, 12);
        assert_eq!(config.reconnect.signature_threshold, Threshold::SuperMajority);
        assert_eq!(config.metrics.namespace, "node7");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = NodeConfig::for_node(1);
        assert!(config.validate().is_ok());

        config.reconnect.state_tree_depth = 0;
        assert!(matches!(config.validate(), Err(CoreError::Configuration(_))));

        let mut config = NodeConfig::for_node(1);
        config.fallen_behind.threshold_fraction = 1.5;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::for_node(1);
        config.reconnect.session_timeout_ms = 10;
        assert!(config.validate().is_err());

        assert!(NodeConfig::parse("[node]\nid = 1\n[intake]\nrounds_non_ancient = 0\n").is_err());
    }
}
