//! Event linker integration tests
//!
//! Delivery order, missing-parent handling and pruning across window advances

use chrono::{DateTime, Duration, TimeZone, Utc};
use hgraph_core::{Event, EventBuilder, EventDescriptor, EventHash, EventWindow, NodeId, Round};
use hgraph_dag::{
    AnomalyPolicy, EventLinker, LinkedEvent, LinkerMetrics, LinkerObserver, MetricsObserver,
    ParentLink,
};
use parking_lot::Mutex;
use prometheus::Registry;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).single().unwrap()
}

/// Build a gossip DAG in topological order.
///
/// Each step `(creator, other)` appends one event by `creator` whose
/// self-parent is that creator's latest event and whose other-parent is the
/// latest event of `other` (if any, and if different).
fn gossip_dag(creators: u64, steps: &[(u64, u64)], events_per_round: usize) -> Vec<Event> {
    let mut latest: HashMap<u64, EventDescriptor> = HashMap::new();
    let mut events = Vec::with_capacity(steps.len());

    for (i, (creator, other)) in steps.iter().enumerate() {
        let creator = creator % creators;
        let other = other % creators;
        let birth_round = (i / events_per_round) as Round + 1;

        let mut builder = EventBuilder::new(NodeId(creator), birth_round)
            .time_created(epoch() + Duration::milliseconds(i as i64 + 1))
            .transaction(vec![i as u8]);
        if let Some(sp) = latest.get(&creator) {
            builder = builder.self_parent(*sp);
        }
        if other != creator {
            if let Some(op) = latest.get(&other) {
                builder = builder.other_parent(*op);
            }
        }

        let event = builder.build();
        latest.insert(creator, event.descriptor());
        events.push(event);
    }

    events
}

#[derive(Default)]
struct RecordingObserver {
    missing: Mutex<Vec<(EventHash, EventDescriptor)>>,
    ancient: Mutex<Vec<EventHash>>,
}

impl LinkerObserver for RecordingObserver {
    fn child_has_missing_parent(&self, child: &Event, parent: &EventDescriptor) {
        self.missing.lock().push((child.hash, *parent));
    }

    fn event_has_become_ancient(&self, event: &LinkedEvent) {
        self.ancient.lock().push(event.hash());
    }
}

// ============================================================================
// Delivery Order
// ============================================================================

proptest! {
    #[test]
    fn linked_parents_are_always_delivered_first(
        steps in prop::collection::vec((0u64..5, 0u64..5), 1..120),
        events_per_round in 1usize..8,
        advance_at in 0usize..120,
        keep_rounds in 0u64..4,
    ) {
        let linker = EventLinker::new();
        let events = gossip_dag(5, &steps, events_per_round);
        let mut delivered: HashSet<EventHash> = HashSet::new();

        for (i, event) in events.into_iter().enumerate() {
            if i == advance_at {
                let latest = event.birth_round.saturating_sub(1);
                let window = EventWindow::from_latest_round(latest, keep_rounds);
                linker.set_event_window(window).unwrap();
            }

            let window = linker.event_window();
            if let Some(linked) = linker.link_next(event) {
                for parent in linked.linked_parents() {
                    prop_assert!(delivered.contains(&parent.hash));
                    prop_assert!(!window.is_ancient(parent.birth_round));
                }
                delivered.insert(linked.hash());
            }
        }
    }

    #[test]
    fn in_order_feed_without_pruning_is_fully_linked(
        steps in prop::collection::vec((0u64..4, 0u64..4), 1..80),
    ) {
        let linker = EventLinker::new();
        for event in gossip_dag(4, &steps, 4) {
            let linked = linker.link_next(event).unwrap();
            prop_assert!(linked.is_fully_linked());
        }
    }
}

// ============================================================================
// Missing Parents
// ============================================================================

#[test]
fn test_pruned_self_parent_is_reported_once_and_still_delivered() {
    let registry = Registry::new();
    let metrics = LinkerMetrics::register(&registry, "test").unwrap();
    let recorder = Arc::new(RecordingObserver::default());
    let observer = Arc::new(MetricsObserver::wrapping(metrics.clone(), recorder.clone()));
    let linker = EventLinker::with_observer(AnomalyPolicy::default(), observer);

    let e1 = EventBuilder::new(NodeId(1), 1).time_created(epoch()).build();
    linker.link_next(e1.clone()).unwrap();

    linker
        .set_event_window(EventWindow::new(1, 1).unwrap())
        .unwrap();
    assert_eq!(recorder.ancient.lock().as_slice(), &[e1.hash]);

    let e2 = EventBuilder::new(NodeId(1), 2)
        .time_created(epoch() + Duration::seconds(1))
        .self_parent(e1.descriptor())
        .build();

    let linked = linker.link_next(e2.clone()).expect("E2 must still be delivered");
    assert_eq!(linked.self_parent(), Some(&ParentLink::Missing(e1.descriptor())));
    assert_eq!(metrics.missing_parent.get(), 1);
    assert_eq!(recorder.missing.lock().as_slice(), &[(e2.hash, e1.descriptor())]);

    println!("✓ Pruned self-parent reported exactly once");
}

#[test]
fn test_strict_policy_rejects_missing_parent() {
    let linker = EventLinker::with_observer(AnomalyPolicy::strict(), Arc::new(hgraph_dag::NoopObserver));
    let ghost = EventBuilder::new(NodeId(2), 1).time_created(epoch()).build();
    let child = EventBuilder::new(NodeId(1), 1)
        .time_created(epoch())
        .other_parent(ghost.descriptor())
        .build();

    assert!(linker.link_next(child).is_none());
    assert!(linker.is_empty());
}

// ============================================================================
// Ancient Events and Pruning
// ============================================================================

#[test]
fn test_ancient_events_are_counted_not_linked() {
    let registry = Registry::new();
    let metrics = LinkerMetrics::register(&registry, "test").unwrap();
    let linker = EventLinker::with_observer(
        AnomalyPolicy::default(),
        Arc::new(MetricsObserver::new(metrics.clone())),
    );
    linker
        .set_event_window(EventWindow::new(10, 5).unwrap())
        .unwrap();

    for round in 1..=5 {
        let event = EventBuilder::new(NodeId(1), round).time_created(epoch()).build();
        assert!(linker.link_next(event).is_none());
    }
    let fresh = EventBuilder::new(NodeId(1), 6).time_created(epoch()).build();
    assert!(linker.link_next(fresh).is_some());

    assert_eq!(metrics.ancient_dropped.get(), 5);
    assert_eq!(metrics.linked.get(), 1);
}

#[test]
fn test_pruning_bounds_working_set() {
    let linker = EventLinker::new();
    let steps: Vec<(u64, u64)> = (0..200).map(|i| (i % 4, (i + 1) % 4)).collect();
    let events = gossip_dag(4, &steps, 10);

    for event in events {
        let round = event.birth_round;
        linker.link_next(event);
        if round > 3 {
            let window = EventWindow::from_latest_round(round - 1, 2);
            if linker.event_window().check_advance(&window).is_ok() {
                linker.set_event_window(window).unwrap();
            }
        }
    }

    // At most three rounds of ten events stay resident
    assert!(linker.len() <= 30, "working set too large: {}", linker.len());
    println!("✓ Working set bounded at {} events", linker.len());
}

#[test]
fn test_concurrent_linking_from_many_creators() {
    let linker = Arc::new(EventLinker::new());
    let mut handles = Vec::new();

    for creator in 0..8u64 {
        let linker = linker.clone();
        handles.push(std::thread::spawn(move || {
            let mut previous: Option<EventDescriptor> = None;
            for i in 0..50i64 {
                let mut builder = EventBuilder::new(NodeId(creator), 1)
                    .time_created(epoch() + Duration::milliseconds(i));
                if let Some(sp) = previous {
                    builder = builder.self_parent(sp);
                }
                let event = builder.build();
                previous = Some(event.descriptor());
                let linked = linker.link_next(event).unwrap();
                assert!(linked.is_fully_linked());
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(linker.len(), 400);
}
