//! Prometheus counters for intake

use prometheus::{IntCounter, Opts, Registry};

/// Validator outcomes and intake counter anomalies
#[derive(Clone)]
pub struct IntakeMetrics {
    /// Events that passed validation
    pub valid: IntCounter,

    /// Events whose signature did not verify
    pub bad_signature: IntCounter,

    /// Events whose creator is not in the roster for their birth round
    pub unknown_signer: IntCounter,

    /// Events whose stored hash differs from their content
    pub hash_mismatch: IntCounter,

    /// Ancient events dropped without verification
    pub ancient_skipped: IntCounter,

    /// `exit` calls without a matching `enter`
    pub counter_underflow: IntCounter,
}

impl IntakeMetrics {
    /// Create the counters and register them into `registry`
    pub fn register(registry: &Registry, namespace: &str) -> prometheus::Result<Self> {
        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let c = IntCounter::with_opts(Opts::new(name, help).namespace(namespace))?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        Ok(Self {
            valid: counter("validator_valid_total", "Events that passed signature validation")?,
            bad_signature: counter(
                "validator_bad_signature_total",
                "Events dropped for an invalid signature",
            )?,
            unknown_signer: counter(
                "validator_unknown_signer_total",
                "Events whose creator is absent from the roster for their round",
            )?,
            hash_mismatch: counter(
                "validator_hash_mismatch_total",
                "Events whose hash does not match their content",
            )?,
            ancient_skipped: counter(
                "validator_ancient_skipped_total",
                "Ancient events dropped without verification",
            )?,
            counter_underflow: counter(
                "intake_counter_underflow_total",
                "Intake counter exits without a matching enter",
            )?,
        })
    }
}
