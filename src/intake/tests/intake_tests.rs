//! Intake integration tests: signature validation and per-peer tallies

use hgraph_core::traits::SignatureVerifier;
use hgraph_core::{Event, EventBuilder, EventWindow, NodeId, Roster, RosterEntry, RosterHistory};
use hgraph_crypto::{Ed25519Verifier, KeyPair};
use hgraph_intake::{
    DefaultIntakeEventCounter, IntakeEventCounter, IntakeMetrics, SignatureValidator,
    ValidationFailure,
};
use prometheus::Registry;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Ed25519 verifier that counts invocations
#[derive(Default)]
struct CountingVerifier {
    calls: AtomicUsize,
}

impl SignatureVerifier for CountingVerifier {
    fn verify(&self, data: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ed25519Verifier.verify(data, signature, public_key)
    }
}

fn metrics() -> IntakeMetrics {
    IntakeMetrics::register(&Registry::new(), "test").unwrap()
}

fn signed_event(keys: &KeyPair, creator: u64, round: u64) -> Event {
    let mut event = EventBuilder::new(NodeId(creator), round)
        .transaction(vec![round as u8])
        .build();
    keys.sign_event(&mut event);
    event
}

// ============================================================================
// Signature Validator
// ============================================================================

proptest! {
    #[test]
    fn ancient_events_are_never_verified(
        threshold in 1u64..50,
        rounds in prop::collection::vec(1u64..60, 1..40),
    ) {
        let keys = KeyPair::from_seed([3u8; 32]);
        let roster = Roster::new(vec![RosterEntry::new(NodeId(1), keys.public_key_bytes(), 1)]);
        let verifier = Arc::new(CountingVerifier::default());
        let validator = SignatureValidator::new(
            RosterHistory::single(1, 1, roster),
            verifier.clone(),
            metrics(),
        );
        validator.set_event_window(EventWindow::new(threshold, threshold).unwrap()).unwrap();

        let mut expected_calls = 0;
        for round in rounds {
            let event = signed_event(&keys, 1, round);
            let result = validator.validate(event);
            if round <= threshold {
                prop_assert!(result.is_none());
            } else {
                expected_calls += 1;
                prop_assert!(result.is_some());
            }
            prop_assert_eq!(verifier.calls.load(Ordering::SeqCst), expected_calls);
        }
    }
}

#[test]
fn test_event_rejected_under_old_roster_accepted_after_update() {
    let old_member = KeyPair::generate();
    let new_member = KeyPair::generate();

    let v1 = Roster::new(vec![RosterEntry::new(NodeId(1), old_member.public_key_bytes(), 10)]);
    let v2 = Roster::new(vec![
        RosterEntry::new(NodeId(1), old_member.public_key_bytes(), 10),
        RosterEntry::new(NodeId(2), new_member.public_key_bytes(), 10),
    ]);

    let validator = SignatureValidator::new(
        RosterHistory::single(1, 1, v1.clone()),
        Arc::new(Ed25519Verifier),
        metrics(),
    );

    let event = signed_event(&new_member, 2, 5);
    assert!(validator.validate(event.clone()).is_none());
    assert_eq!(validator.metrics().unknown_signer.get(), 1);

    let history = RosterHistory::new(2, vec![(1, v1), (5, v2)]).unwrap();
    validator.update_roster_history(history);
    assert!(validator.validate(event).is_some());
    assert_eq!(validator.roster_history().version(), 2);

    println!("✓ Roster update admits the new signer");
}

#[test]
fn test_signature_by_wrong_key_is_dropped() {
    let member = KeyPair::generate();
    let impostor = KeyPair::generate();
    let roster = Roster::new(vec![RosterEntry::new(NodeId(1), member.public_key_bytes(), 10)]);
    let validator = SignatureValidator::new(
        RosterHistory::single(1, 1, roster),
        Arc::new(Ed25519Verifier),
        metrics(),
    );

    let forged = signed_event(&impostor, 1, 1);
    assert_eq!(validator.check(&forged), Err(ValidationFailure::BadSignature));
    assert_eq!(validator.metrics().bad_signature.get(), 1);
}

#[test]
fn test_batch_preserves_order_and_drops_invalid() {
    let keys = KeyPair::generate();
    let roster = Roster::new(vec![RosterEntry::new(NodeId(1), keys.public_key_bytes(), 10)]);
    let validator = SignatureValidator::new(
        RosterHistory::single(1, 1, roster),
        Arc::new(Ed25519Verifier),
        metrics(),
    );

    let mut events: Vec<Event> = (1..=64).map(|round| signed_event(&keys, 1, round)).collect();
    events[10].signature[0] ^= 0xff;
    events[20].creator = NodeId(9);
    let hashes: Vec<_> = events.iter().map(|e| e.hash).collect();

    let results = validator.validate_batch(events);
    assert_eq!(results.len(), 64);
    for (i, result) in results.iter().enumerate() {
        match i {
            10 | 20 => assert!(result.is_none()),
            _ => assert_eq!(result.as_ref().map(|e| e.hash), Some(hashes[i])),
        }
    }
}

#[test]
fn test_concurrent_roster_updates_never_tear() {
    let keys = KeyPair::generate();
    let roster = Roster::new(vec![RosterEntry::new(NodeId(1), keys.public_key_bytes(), 10)]);
    let validator = Arc::new(SignatureValidator::new(
        RosterHistory::single(1, 1, roster.clone()),
        Arc::new(Ed25519Verifier),
        metrics(),
    ));
    let event = signed_event(&keys, 1, 100);

    let writer = {
        let validator = validator.clone();
        let roster = roster.clone();
        std::thread::spawn(move || {
            for version in 2..200 {
                validator.update_roster_history(RosterHistory::single(version, 1, roster.clone()));
            }
        })
    };

    for _ in 0..500 {
        assert!(validator.validate(event.clone()).is_some());
    }
    writer.join().unwrap();
}

// ============================================================================
// Intake Counter
// ============================================================================

#[derive(Debug, Clone)]
enum CounterOp {
    Enter(u64),
    Exit(u64),
    Reset,
}

fn counter_op() -> impl Strategy<Value = CounterOp> {
    prop_oneof![
        4 => (0u64..4).prop_map(CounterOp::Enter),
        4 => (0u64..4).prop_map(CounterOp::Exit),
        1 => Just(CounterOp::Reset),
    ]
}

proptest! {
    #[test]
    fn tally_tracks_model_and_never_underflows(ops in prop::collection::vec(counter_op(), 0..200)) {
        let counter = DefaultIntakeEventCounter::new();
        let mut model = [0u64; 4];

        for op in ops {
            match op {
                CounterOp::Enter(p) => {
                    counter.enter(NodeId(p));
                    model[p as usize] += 1;
                }
                CounterOp::Exit(p) => {
                    counter.exit(NodeId(p));
                    model[p as usize] = model[p as usize].saturating_sub(1);
                }
                CounterOp::Reset => {
                    counter.reset();
                    model = [0; 4];
                }
            }

            for p in 0..4u64 {
                prop_assert_eq!(counter.count(&NodeId(p)), model[p as usize]);
                prop_assert_eq!(counter.has_unprocessed(&NodeId(p)), model[p as usize] > 0);
            }
        }
    }
}

#[test]
fn test_concurrent_enter_exit_balances() {
    let counter = Arc::new(DefaultIntakeEventCounter::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let counter = counter.clone();
            std::thread::spawn(move || {
                let peer = NodeId(i % 3);
                for _ in 0..1000 {
                    counter.enter(peer);
                    counter.exit(peer);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(counter.total(), 0);
}
