//! Prometheus counters for reconnect

use prometheus::{IntCounter, Opts, Registry};

#[derive(Clone)]
pub struct ReconnectMetrics {
    /// Sessions started against a teacher
    pub attempts: IntCounter,

    pub successes: IntCounter,

    pub failures: IntCounter,

    /// Times every eligible teacher failed
    pub stalls: IntCounter,

    /// Leaf buckets received from teachers
    pub buckets_transferred: IntCounter,
}

impl ReconnectMetrics {
    pub fn register(registry: &Registry, namespace: &str) -> prometheus::Result<Self> {
        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let c = IntCounter::with_opts(Opts::new(name, help).namespace(namespace))?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        Ok(Self {
            attempts: counter("reconnect_attempts_total", "Reconnect sessions started")?,
            successes: counter("reconnect_successes_total", "Reconnect sessions that succeeded")?,
            failures: counter("reconnect_failures_total", "Reconnect sessions that failed")?,
            stalls: counter(
                "reconnect_stalls_total",
                "Recoveries abandoned after every eligible teacher failed",
            )?,
            buckets_transferred: counter(
                "reconnect_buckets_transferred_total",
                "State tree buckets received during reconnect",
            )?,
        })
    }
}
