//! Pipeline metrics
//!
//! Every pipeline owns its registry, so two pipelines in one process never
//! share counters.

use hgraph_dag::LinkerMetrics;
use hgraph_intake::IntakeMetrics;
use hgraph_reconnect::ReconnectMetrics;
use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};

pub struct PipelineMetrics {
    registry: Registry,
    pub linker: LinkerMetrics,
    pub intake: IntakeMetrics,
    pub reconnect: ReconnectMetrics,

    /// Events refused while a reconnect was running
    pub suspended_drops: IntCounter,
    pub stale_events: IntCounter,
    pub callback_panics: IntCounter,
    pub callback_over_budget: IntCounter,
}

impl PipelineMetrics {
    pub fn new(namespace: &str) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let c = IntCounter::with_opts(Opts::new(name, help).namespace(namespace))?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let suspended_drops = counter(
            "pipeline_suspended_drops_total",
            "Events refused while a reconnect was running",
        )?;
        let stale_events = counter(
            "pipeline_stale_self_events_total",
            "Self events that became ancient before consensus",
        )?;
        let callback_panics = counter(
            "pipeline_callback_panics_total",
            "Application callbacks that panicked",
        )?;
        let callback_over_budget = counter(
            "pipeline_callback_over_budget_total",
            "Application callbacks that exceeded the step budget",
        )?;

        Ok(Self {
            linker: LinkerMetrics::register(&registry, namespace)?,
            intake: IntakeMetrics::register(&registry, namespace)?,
            reconnect: ReconnectMetrics::register(&registry, namespace)?,
            suspended_drops,
            stale_events,
            callback_panics,
            callback_over_budget,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every metric in the text exposition format
    pub fn export(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
