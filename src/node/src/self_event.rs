//! Self-event creation

use crate::callbacks::CallbackDispatcher;
use chrono::{DateTime, Duration, Utc};
use hgraph_core::{Event, EventBuilder, EventDescriptor, EventWindow, NodeId, SystemTransaction};
use hgraph_crypto::KeyPair;
use parking_lot::Mutex;
use tracing::debug;

struct LastSelfEvent {
    descriptor: EventDescriptor,
    time_created: DateTime<Utc>,
}

/// Builds and signs this node's events.
///
/// Each event is born in the round after the latest consensus round, takes
/// the previous self event as self-parent while it is still non-ancient and
/// is created strictly after it.
pub struct SelfEventBuilder {
    node_id: NodeId,
    keys: KeyPair,
    last: Mutex<Option<LastSelfEvent>>,
}

impl SelfEventBuilder {
    pub fn new(node_id: NodeId, keys: KeyPair) -> Self {
        Self {
            node_id,
            keys,
            last: Mutex::new(None),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.keys.public_key_bytes()
    }

    /// Create the next self event
    pub fn build(
        &self,
        window: &EventWindow,
        other_parents: Vec<EventDescriptor>,
        system_transactions: &[SystemTransaction],
        transactions: Vec<Vec<u8>>,
        dispatcher: &CallbackDispatcher,
    ) -> hgraph_core::Result<Event> {
        let mut payload = Vec::with_capacity(system_transactions.len() + transactions.len());
        for tx in system_transactions {
            payload.push(dispatcher.encode(tx)?);
        }
        payload.extend(transactions);

        let mut last = self.last.lock();

        let mut time_created = Utc::now();
        let mut builder = EventBuilder::new(self.node_id, window.pending_round());
        if let Some(previous) = last.as_ref() {
            if time_created <= previous.time_created {
                time_created = previous.time_created + Duration::microseconds(1);
            }
            if !window.is_ancient(previous.descriptor.birth_round) {
                builder = builder.self_parent(previous.descriptor);
            }
        }

        for parent in other_parents {
            builder = builder.other_parent(parent);
        }

        let mut event = builder
            .time_created(time_created)
            .transactions(payload)
            .build();
        self.keys.sign_event(&mut event);

        debug!(
            event = %event.hash,
            birth_round = event.birth_round,
            transactions = event.transactions.len(),
            "Created self event"
        );
        *last = Some(LastSelfEvent {
            descriptor: event.descriptor(),
            time_created,
        });
        Ok(event)
    }

    /// Forget the self-parent chain, used at a reconnect boundary
    pub fn reset(&self) {
        *self.last.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgraph_core::traits::{ApplicationCallbacks, NoopCallbacks};
    use std::sync::Arc;

    fn dispatcher() -> CallbackDispatcher {
        CallbackDispatcher::new(Arc::new(NoopCallbacks), std::time::Duration::from_secs(1))
    }

    #[test]
    fn test_chain_is_linked_and_time_increases() {
        let builder = SelfEventBuilder::new(NodeId(2), KeyPair::generate());
        let window = EventWindow::new(4, 1).unwrap();

        let first = builder.build(&window, vec![], &[], vec![], &dispatcher()).unwrap();
        let second = builder.build(&window, vec![], &[], vec![], &dispatcher()).unwrap();

        assert_eq!(first.birth_round, 5);
        assert!(first.self_parent.is_none());
        assert_eq!(second.self_parent, Some(first.descriptor()));
        assert!(second.time_created > first.time_created);
        assert!(second.verify_hash().is_ok());
    }

    #[test]
    fn test_system_transactions_come_first() {
        let builder = SelfEventBuilder::new(NodeId(2), KeyPair::generate());
        let tx = SystemTransaction::StateSignature {
            round: 3,
            state_hash: [7u8; 32],
            signature: vec![1, 2],
        };

        let event = builder
            .build(
                &EventWindow::genesis(),
                vec![],
                &[tx.clone()],
                vec![b"app".to_vec()],
                &dispatcher(),
            )
            .unwrap();

        assert_eq!(event.transactions.len(), 2);
        assert_eq!(event.transactions[0], encoded(&tx));
        assert_eq!(event.transactions[1], b"app".to_vec());
    }

    fn encoded(tx: &SystemTransaction) -> Vec<u8> {
        NoopCallbacks.encode_system_transaction(tx).unwrap()
    }

    #[test]
    fn test_ancient_self_parent_dropped() {
        let builder = SelfEventBuilder::new(NodeId(2), KeyPair::generate());
        builder
            .build(&EventWindow::genesis(), vec![], &[], vec![], &dispatcher())
            .unwrap();

        let event = builder
            .build(&EventWindow::at_snapshot(10), vec![], &[], vec![], &dispatcher())
            .unwrap();
        assert_eq!(event.birth_round, 11);
        assert!(event.self_parent.is_none());
    }
}
