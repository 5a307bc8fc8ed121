//! Linker notifications
//!
//! Observers are invoked synchronously from the linking path while the
//! window read lock is held. They must not block and must not call back into
//! the linker.

use crate::linked_event::LinkedEvent;
use crate::metrics::LinkerMetrics;
use crate::policy::Anomaly;
use chrono::{DateTime, Utc};
use hgraph_core::{Event, EventDescriptor, Round};
use std::sync::Arc;

/// Receives structural anomaly and lifecycle notifications
pub trait LinkerObserver: Send + Sync {
    fn child_has_missing_parent(&self, _child: &Event, _parent: &EventDescriptor) {}

    fn parent_has_incorrect_birth_round(
        &self,
        _child: &Event,
        _claimed: &EventDescriptor,
        _actual_birth_round: Round,
    ) {
    }

    fn child_time_is_not_after_self_parent_time(
        &self,
        _child: &Event,
        _self_parent_time: DateTime<Utc>,
    ) {
    }

    /// A resident event was pruned by a window advance
    fn event_has_become_ancient(&self, _event: &LinkedEvent) {}

    fn ancient_event_dropped(&self, _event: &Event) {}

    fn duplicate_event(&self, _event: &Event) {}

    fn event_rejected(&self, _event: &Event, _anomaly: Anomaly) {}

    fn event_linked(&self, _event: &LinkedEvent) {}
}

/// Observer that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl LinkerObserver for NoopObserver {}

/// Counts every notification, then forwards it to the wrapped observer
pub struct MetricsObserver {
    metrics: LinkerMetrics,
    inner: Arc<dyn LinkerObserver>,
}

impl MetricsObserver {
    pub fn new(metrics: LinkerMetrics) -> Self {
        Self::wrapping(metrics, Arc::new(NoopObserver))
    }

    pub fn wrapping(metrics: LinkerMetrics, inner: Arc<dyn LinkerObserver>) -> Self {
        Self { metrics, inner }
    }

    pub fn metrics(&self) -> &LinkerMetrics {
        &self.metrics
    }
}

impl LinkerObserver for MetricsObserver {
    fn child_has_missing_parent(&self, child: &Event, parent: &EventDescriptor) {
        self.metrics.missing_parent.inc();
        self.inner.child_has_missing_parent(child, parent);
    }

    fn parent_has_incorrect_birth_round(
        &self,
        child: &Event,
        claimed: &EventDescriptor,
        actual_birth_round: Round,
    ) {
        self.metrics.birth_round_mismatch.inc();
        self.inner
            .parent_has_incorrect_birth_round(child, claimed, actual_birth_round);
    }

    fn child_time_is_not_after_self_parent_time(
        &self,
        child: &Event,
        self_parent_time: DateTime<Utc>,
    ) {
        self.metrics.time_mismatch.inc();
        self.inner
            .child_time_is_not_after_self_parent_time(child, self_parent_time);
    }

    fn event_has_become_ancient(&self, event: &LinkedEvent) {
        self.metrics.became_ancient.inc();
        self.inner.event_has_become_ancient(event);
    }

    fn ancient_event_dropped(&self, event: &Event) {
        self.metrics.ancient_dropped.inc();
        self.inner.ancient_event_dropped(event);
    }

    fn duplicate_event(&self, event: &Event) {
        self.metrics.duplicates.inc();
        self.inner.duplicate_event(event);
    }

    fn event_rejected(&self, event: &Event, anomaly: Anomaly) {
        self.metrics.rejected.inc();
        self.inner.event_rejected(event, anomaly);
    }

    fn event_linked(&self, event: &LinkedEvent) {
        self.metrics.linked.inc();
        self.inner.event_linked(event);
    }
}
