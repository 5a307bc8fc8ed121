//! Prometheus counters for the event linker

use prometheus::{IntCounter, Opts, Registry};

/// Linker anomaly and throughput counters
#[derive(Clone)]
pub struct LinkerMetrics {
    /// Parent descriptors that did not resolve
    pub missing_parent: IntCounter,

    /// Resolved parents whose birth round differed from the claim
    pub birth_round_mismatch: IntCounter,

    /// Children not created after their self-parent
    pub time_mismatch: IntCounter,

    /// Events dropped on arrival because they were already ancient
    pub ancient_dropped: IntCounter,

    /// Events whose hash was already resident
    pub duplicates: IntCounter,

    /// Events rejected by the anomaly policy
    pub rejected: IntCounter,

    /// Events admitted into the working set
    pub linked: IntCounter,

    /// Resident events pruned on window advance
    pub became_ancient: IntCounter,
}

impl LinkerMetrics {
    /// Create the counters and register them into `registry`
    pub fn register(registry: &Registry, namespace: &str) -> prometheus::Result<Self> {
        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let c = IntCounter::with_opts(Opts::new(name, help).namespace(namespace))?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        Ok(Self {
            missing_parent: counter(
                "linker_missing_parent_total",
                "Parent descriptors that did not resolve",
            )?,
            birth_round_mismatch: counter(
                "linker_birth_round_mismatch_total",
                "Parents whose actual birth round differed from the descriptor",
            )?,
            time_mismatch: counter(
                "linker_time_mismatch_total",
                "Children not created strictly after their self-parent",
            )?,
            ancient_dropped: counter(
                "linker_ancient_dropped_total",
                "Events dropped on arrival because they were ancient",
            )?,
            duplicates: counter("linker_duplicate_total", "Events already in the working set")?,
            rejected: counter("linker_rejected_total", "Events rejected by the anomaly policy")?,
            linked: counter("linker_linked_total", "Events admitted into the working set")?,
            became_ancient: counter(
                "linker_became_ancient_total",
                "Resident events pruned after becoming ancient",
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_into_private_registry() {
        let registry = Registry::new();
        let metrics = LinkerMetrics::register(&registry, "test").unwrap();
        metrics.missing_parent.inc();

        let families = registry.gather();
        assert_eq!(families.len(), 8);
        assert!(families
            .iter()
            .any(|f| f.get_name() == "test_linker_missing_parent_total"));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        LinkerMetrics::register(&registry, "test").unwrap();
        assert!(LinkerMetrics::register(&registry, "test").is_err());
    }
}
