//! Event linker
//!
//! Resolves each event's parent descriptors against the working set of
//! non-ancient events and admits it as a [`LinkedEvent`]. Callers feed events
//! in per-creator topological order; the linker does not resequence.
//!
//! The working set is a concurrent map keyed by hash. The event window sits
//! behind an `RwLock`: linking holds the read side from the ancient check
//! through insertion, and a window advance takes the write side to prune, so
//! no event from a pruned round can be inserted after the pruning pass.

use crate::error::{DagError, Result};
use crate::linked_event::{LinkedEvent, ParentLink};
use crate::observer::{LinkerObserver, NoopObserver};
use crate::policy::{Anomaly, AnomalyAction, AnomalyPolicy};
use crate::pruning::{PruningStats, RoundIndex};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hgraph_core::{Event, EventDescriptor, EventHash, EventWindow};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Links events into the local DAG
pub struct EventLinker {
    window: RwLock<EventWindow>,
    working_set: DashMap<EventHash, Arc<LinkedEvent>>,
    round_index: RoundIndex,
    policy: AnomalyPolicy,
    observer: Arc<dyn LinkerObserver>,
}

impl EventLinker {
    /// Linker with the default policy and no observer
    pub fn new() -> Self {
        Self::with_observer(AnomalyPolicy::default(), Arc::new(NoopObserver))
    }

    pub fn with_observer(policy: AnomalyPolicy, observer: Arc<dyn LinkerObserver>) -> Self {
        Self {
            window: RwLock::new(EventWindow::genesis()),
            working_set: DashMap::new(),
            round_index: RoundIndex::new(),
            policy,
            observer,
        }
    }

    /// Link the next event.
    ///
    /// Returns `None` when the event is ancient, already resident, or rejected
    /// by the anomaly policy.
    pub fn link_next(&self, event: Event) -> Option<Arc<LinkedEvent>> {
        let window = self.window.read();

        if window.is_ancient(event.birth_round) {
            debug!(
                event = %event.hash,
                birth_round = event.birth_round,
                threshold = window.ancient_threshold(),
                "Dropping ancient event"
            );
            self.observer.ancient_event_dropped(&event);
            return None;
        }

        if self.working_set.contains_key(&event.hash) {
            debug!(event = %event.hash, "Dropping duplicate event");
            self.observer.duplicate_event(&event);
            return None;
        }

        let self_parent = match event.self_parent.as_ref() {
            Some(descriptor) => match self.resolve_self_parent(&event, descriptor) {
                Ok(link) => Some(link),
                Err(anomaly) => return self.reject(&event, anomaly),
            },
            None => None,
        };

        let mut other_parents = Vec::with_capacity(event.other_parents.len());
        for descriptor in &event.other_parents {
            match self.resolve_parent(&event, descriptor) {
                Ok((link, _)) => other_parents.push(link),
                Err(anomaly) => return self.reject(&event, anomaly),
            }
        }

        let hash = event.hash;
        let birth_round = event.birth_round;
        let linked = Arc::new(LinkedEvent::new(event, self_parent, other_parents));

        match self.working_set.entry(hash) {
            Entry::Occupied(_) => {
                debug!(event = %hash, "Lost insertion race to a duplicate event");
                self.observer.duplicate_event(linked.event());
                return None;
            }
            Entry::Vacant(slot) => {
                slot.insert(linked.clone());
            }
        }
        self.round_index.insert(birth_round, hash);

        self.observer.event_linked(&linked);
        Some(linked)
    }

    /// Resolve the self-parent and check the child's creation time against it
    fn resolve_self_parent(
        &self,
        child: &Event,
        descriptor: &EventDescriptor,
    ) -> std::result::Result<ParentLink, Anomaly> {
        let (link, parent) = self.resolve_parent(child, descriptor)?;

        let parent = match (link, parent) {
            (ParentLink::Linked(_), Some(parent)) => parent,
            (link, _) => return Ok(link),
        };

        let parent_time = parent.event().time_created;
        if child.time_created > parent_time {
            return Ok(link);
        }

        warn!(
            event = %child.hash,
            creator = %child.creator,
            child_time = %child.time_created,
            self_parent_time = %parent_time,
            "Child is not created after its self-parent"
        );
        self.observer
            .child_time_is_not_after_self_parent_time(child, parent_time);

        match self.policy.action_for(Anomaly::TimeNotAfterSelfParent) {
            AnomalyAction::Keep => Ok(link),
            AnomalyAction::Sever => Ok(ParentLink::Severed(*descriptor)),
            AnomalyAction::Reject => Err(Anomaly::TimeNotAfterSelfParent),
        }
    }

    /// Look up one parent descriptor and apply the policy to any anomaly
    fn resolve_parent(
        &self,
        child: &Event,
        descriptor: &EventDescriptor,
    ) -> std::result::Result<(ParentLink, Option<Arc<LinkedEvent>>), Anomaly> {
        let parent = match self.working_set.get(&descriptor.hash) {
            Some(entry) => entry.value().clone(),
            None => {
                debug!(
                    event = %child.hash,
                    parent = %descriptor,
                    "Parent not in working set"
                );
                self.observer.child_has_missing_parent(child, descriptor);

                return match self.policy.action_for(Anomaly::MissingParent) {
                    AnomalyAction::Keep => Ok((ParentLink::Missing(*descriptor), None)),
                    AnomalyAction::Sever => Ok((ParentLink::Severed(*descriptor), None)),
                    AnomalyAction::Reject => Err(Anomaly::MissingParent),
                };
            }
        };

        if parent.birth_round() != descriptor.birth_round {
            warn!(
                event = %child.hash,
                parent = %descriptor,
                actual_birth_round = parent.birth_round(),
                "Parent has incorrect birth round"
            );
            self.observer
                .parent_has_incorrect_birth_round(child, descriptor, parent.birth_round());

            return match self.policy.action_for(Anomaly::BirthRoundMismatch) {
                AnomalyAction::Keep => Ok((ParentLink::Linked(*descriptor), Some(parent))),
                AnomalyAction::Sever => Ok((ParentLink::Severed(*descriptor), None)),
                AnomalyAction::Reject => Err(Anomaly::BirthRoundMismatch),
            };
        }

        Ok((ParentLink::Linked(*descriptor), Some(parent)))
    }

    fn reject(&self, event: &Event, anomaly: Anomaly) -> Option<Arc<LinkedEvent>> {
        debug!(event = %event.hash, %anomaly, "Event rejected by anomaly policy");
        self.observer.event_rejected(event, anomaly);
        None
    }

    /// Advance the event window and prune everything that became ancient.
    ///
    /// A window that moves either boundary backwards is an invariant
    /// violation; use [`EventLinker::clear`] at reconnect boundaries.
    pub fn set_event_window(&self, next: EventWindow) -> Result<PruningStats> {
        let mut window = self.window.write();
        window
            .check_advance(&next)
            .map_err(|e| DagError::InvariantViolation(e.to_string()))?;
        *window = next;

        let mut pruned = 0;
        for hash in self.round_index.drain_through(next.ancient_threshold()) {
            if let Some((_, event)) = self.working_set.remove(&hash) {
                self.observer.event_has_become_ancient(&event);
                pruned += 1;
            }
        }

        let stats = PruningStats {
            pruned,
            remaining: self.working_set.len(),
            threshold: next.ancient_threshold(),
        };
        if pruned > 0 {
            debug!(
                pruned = stats.pruned,
                remaining = stats.remaining,
                threshold = stats.threshold,
                "Pruned ancient events"
            );
        }
        Ok(stats)
    }

    /// Drop the whole working set and restart from `window`
    pub fn clear(&self, window: EventWindow) {
        let mut current = self.window.write();
        let dropped = self.working_set.len();
        self.working_set.clear();
        self.round_index.clear();
        *current = window;
        info!(dropped, %window, "Linker reset");
    }

    pub fn event_window(&self) -> EventWindow {
        *self.window.read()
    }

    pub fn get(&self, hash: &EventHash) -> Option<Arc<LinkedEvent>> {
        self.working_set.get(hash).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, hash: &EventHash) -> bool {
        self.working_set.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.working_set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.working_set.is_empty()
    }

    pub fn policy(&self) -> &AnomalyPolicy {
        &self.policy
    }
}

impl Default for EventLinker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use hgraph_core::{EventBuilder, NodeId};

    #[test]
    fn test_link_genesis_event() {
        let linker = EventLinker::new();
        let event = EventBuilder::new(NodeId(1), 1).build();

        let linked = linker.link_next(event.clone()).unwrap();
        assert!(linked.is_fully_linked());
        assert!(linker.contains(&event.hash));
        assert_eq!(linker.len(), 1);
    }

    #[test]
    fn test_duplicate_returns_none() {
        let linker = EventLinker::new();
        let event = EventBuilder::new(NodeId(1), 1).build();

        assert!(linker.link_next(event.clone()).is_some());
        assert!(linker.link_next(event).is_none());
        assert_eq!(linker.len(), 1);
    }

    #[test]
    fn test_self_parent_links() {
        let linker = EventLinker::new();
        let now = Utc::now();
        let parent = EventBuilder::new(NodeId(1), 1).time_created(now).build();
        let child = EventBuilder::new(NodeId(1), 1)
            .time_created(now + Duration::milliseconds(5))
            .self_parent(parent.descriptor())
            .build();

        linker.link_next(parent.clone()).unwrap();
        let linked = linker.link_next(child).unwrap();
        assert_eq!(linked.self_parent(), Some(&ParentLink::Linked(parent.descriptor())));
    }

    #[test]
    fn test_time_mismatch_severs_by_default() {
        let linker = EventLinker::new();
        let now = Utc::now();
        let parent = EventBuilder::new(NodeId(1), 1).time_created(now).build();
        let child = EventBuilder::new(NodeId(1), 1)
            .time_created(now)
            .self_parent(parent.descriptor())
            .transaction(vec![1])
            .build();

        linker.link_next(parent.clone()).unwrap();
        let linked = linker.link_next(child).unwrap();
        assert_eq!(linked.self_parent(), Some(&ParentLink::Severed(parent.descriptor())));
    }

    #[test]
    fn test_birth_round_mismatch_reject_policy() {
        let policy = AnomalyPolicy {
            on_birth_round_mismatch: AnomalyAction::Reject,
            ..AnomalyPolicy::default()
        };
        let linker = EventLinker::with_observer(policy, Arc::new(NoopObserver));
        let now = Utc::now();
        let parent = EventBuilder::new(NodeId(2), 3).time_created(now).build();

        let mut lying = parent.descriptor();
        lying.birth_round = 2;
        let child = EventBuilder::new(NodeId(1), 3)
            .time_created(now)
            .other_parent(lying)
            .build();

        linker.link_next(parent).unwrap();
        assert!(linker.link_next(child.clone()).is_none());
        assert!(!linker.contains(&child.hash));
    }

    #[test]
    fn test_window_advance_prunes() {
        let linker = EventLinker::new();
        for round in 1..=5 {
            linker
                .link_next(EventBuilder::new(NodeId(1), round).build())
                .unwrap();
        }

        let stats = linker
            .set_event_window(EventWindow::new(6, 3).unwrap())
            .unwrap();
        assert_eq!(stats.pruned, 3);
        assert_eq!(stats.remaining, 2);

        assert!(linker
            .link_next(EventBuilder::new(NodeId(2), 3).build())
            .is_none());
    }

    #[test]
    fn test_window_regression_is_error() {
        let linker = EventLinker::new();
        linker
            .set_event_window(EventWindow::new(10, 5).unwrap())
            .unwrap();

        let result = linker.set_event_window(EventWindow::new(8, 5).unwrap());
        assert!(matches!(result, Err(DagError::InvariantViolation(_))));
    }

    #[test]
    fn test_clear_allows_window_reset() {
        let linker = EventLinker::new();
        linker
            .set_event_window(EventWindow::new(10, 5).unwrap())
            .unwrap();
        linker
            .link_next(EventBuilder::new(NodeId(1), 8).build())
            .unwrap();

        linker.clear(EventWindow::at_snapshot(4));
        assert!(linker.is_empty());
        assert_eq!(linker.event_window().ancient_threshold(), 4);
    }
}
