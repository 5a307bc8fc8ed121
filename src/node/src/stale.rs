//! Stale self-event detection
//!
//! A self event is stale when the window advances past its birth round before
//! consensus reached it. The host learns about it so pending transactions can
//! be resubmitted.

use hgraph_core::{Event, EventHash, EventWindow};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Default)]
pub struct StaleEventDetector {
    pending: Mutex<HashMap<EventHash, Event>>,
}

impl StaleEventDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a self event
    pub fn track(&self, event: &Event) {
        self.pending.lock().insert(event.hash, event.clone());
    }

    /// Consensus reached the event; returns whether it was tracked
    pub fn consensus_reached(&self, hash: &EventHash) -> bool {
        self.pending.lock().remove(hash).is_some()
    }

    /// Remove and return tracked events that are ancient under `window`
    pub fn expire(&self, window: &EventWindow) -> Vec<Event> {
        let mut pending = self.pending.lock();
        let stale_hashes: Vec<EventHash> = pending
            .values()
            .filter(|event| window.is_ancient(event.birth_round))
            .map(|event| event.hash)
            .collect();

        let mut stale: Vec<Event> = stale_hashes
            .iter()
            .filter_map(|hash| pending.remove(hash))
            .collect();
        stale.sort_by_key(|event| (event.birth_round, event.time_created));

        if !stale.is_empty() {
            info!(
                stale = stale.len(),
                threshold = window.ancient_threshold(),
                "Self events became stale"
            );
        }
        stale
    }

    /// Forget everything, used at a reconnect boundary
    pub fn clear(&self) {
        let mut pending = self.pending.lock();
        if !pending.is_empty() {
            debug!(dropped = pending.len(), "Stale detector cleared");
        }
        pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgraph_core::{EventBuilder, NodeId};

    #[test]
    fn test_only_unconsented_ancient_events_are_stale() {
        let detector = StaleEventDetector::new();
        let a = EventBuilder::new(NodeId(0), 3).transaction(vec![1]).build();
        let b = EventBuilder::new(NodeId(0), 4).transaction(vec![2]).build();
        let c = EventBuilder::new(NodeId(0), 9).transaction(vec![3]).build();
        for e in [&a, &b, &c] {
            detector.track(e);
        }

        assert!(detector.consensus_reached(&b.hash));

        let stale = detector.expire(&EventWindow::new(8, 5).unwrap());
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].hash, a.hash);
        assert_eq!(detector.len(), 1);
    }
}
