//! Event signature validation
//!
//! The event window and roster history are replaced by writers as a single
//! `Arc` swap. Each validation captures one snapshot of the pair, so a
//! concurrent roster update can never be combined with a stale window.

use crate::error::{IntakeError, Result};
use crate::metrics::IntakeMetrics;
use hgraph_core::traits::SignatureVerifier;
use hgraph_core::{Event, EventWindow, RosterHistory};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Why an event failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    /// Birth round at or below the ancient threshold; never verified
    Ancient,
    /// Stored hash does not match the event content
    HashMismatch,
    /// No roster covers the birth round, or the creator is not in it
    UnknownSigner,
    /// Signature does not verify under the creator's key
    BadSignature,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ValidationFailure::Ancient => "ancient",
            ValidationFailure::HashMismatch => "hash_mismatch",
            ValidationFailure::UnknownSigner => "unknown_signer",
            ValidationFailure::BadSignature => "bad_signature",
        };
        f.write_str(reason)
    }
}

/// Inputs every validation reads together
struct ValidatorInputs {
    window: EventWindow,
    roster_history: Arc<RosterHistory>,
}

/// Authenticates events against the roster covering their birth round
pub struct SignatureValidator {
    inputs: RwLock<Arc<ValidatorInputs>>,
    verifier: Arc<dyn SignatureVerifier>,
    metrics: IntakeMetrics,
}

impl SignatureValidator {
    pub fn new(
        roster_history: RosterHistory,
        verifier: Arc<dyn SignatureVerifier>,
        metrics: IntakeMetrics,
    ) -> Self {
        Self {
            inputs: RwLock::new(Arc::new(ValidatorInputs {
                window: EventWindow::genesis(),
                roster_history: Arc::new(roster_history),
            })),
            verifier,
            metrics,
        }
    }

    /// Return the event if it is authentic, `None` otherwise
    pub fn validate(&self, event: Event) -> Option<Event> {
        let inputs = self.snapshot();
        self.check_with(&inputs, &event).ok().map(|_| event)
    }

    /// Validate and report the failure reason
    pub fn check(&self, event: &Event) -> std::result::Result<(), ValidationFailure> {
        let inputs = self.snapshot();
        self.check_with(&inputs, event)
    }

    /// Validate a burst in parallel against one snapshot, preserving order
    pub fn validate_batch(&self, events: Vec<Event>) -> Vec<Option<Event>> {
        let inputs = self.snapshot();
        events
            .into_par_iter()
            .map(|event| self.check_with(&inputs, &event).ok().map(|_| event))
            .collect()
    }

    /// Like [`validate_batch`](Self::validate_batch) but keeps failure reasons
    pub fn check_batch(&self, events: &[Event]) -> Vec<std::result::Result<(), ValidationFailure>> {
        let inputs = self.snapshot();
        events
            .par_iter()
            .map(|event| self.check_with(&inputs, event))
            .collect()
    }

    fn snapshot(&self) -> Arc<ValidatorInputs> {
        self.inputs.read().clone()
    }

    fn check_with(
        &self,
        inputs: &ValidatorInputs,
        event: &Event,
    ) -> std::result::Result<(), ValidationFailure> {
        if inputs.window.is_ancient(event.birth_round) {
            self.metrics.ancient_skipped.inc();
            return Err(ValidationFailure::Ancient);
        }

        if event.content_hash() != event.hash {
            debug!(event = %event.hash, creator = %event.creator, "Event hash mismatch");
            self.metrics.hash_mismatch.inc();
            return Err(ValidationFailure::HashMismatch);
        }

        let entry = inputs
            .roster_history
            .roster_for_round(event.birth_round)
            .and_then(|roster| roster.get(&event.creator));
        let entry = match entry {
            Some(entry) => entry,
            None => {
                debug!(
                    event = %event.hash,
                    creator = %event.creator,
                    birth_round = event.birth_round,
                    roster_version = inputs.roster_history.version(),
                    "Creator not in roster for birth round"
                );
                self.metrics.unknown_signer.inc();
                return Err(ValidationFailure::UnknownSigner);
            }
        };

        if !self
            .verifier
            .verify(event.hash.as_bytes(), &event.signature, &entry.public_key)
        {
            debug!(event = %event.hash, creator = %event.creator, "Invalid event signature");
            self.metrics.bad_signature.inc();
            return Err(ValidationFailure::BadSignature);
        }

        self.metrics.valid.inc();
        Ok(())
    }

    /// Advance the event window; moving backwards is an invariant violation
    pub fn set_event_window(&self, window: EventWindow) -> Result<()> {
        let mut inputs = self.inputs.write();
        if let Err(e) = inputs.window.check_advance(&window) {
            error!(current = %inputs.window, next = %window, "Validator window regression");
            return Err(IntakeError::InvariantViolation(e.to_string()));
        }

        let roster_history = inputs.roster_history.clone();
        *inputs = Arc::new(ValidatorInputs {
            window,
            roster_history,
        });
        Ok(())
    }

    /// Replace the window unconditionally at a reconnect or restart boundary
    pub fn reset_event_window(&self, window: EventWindow) {
        let mut inputs = self.inputs.write();
        let roster_history = inputs.roster_history.clone();
        *inputs = Arc::new(ValidatorInputs {
            window,
            roster_history,
        });
        info!(%window, "Validator window reset");
    }

    /// Install a new roster history
    pub fn update_roster_history(&self, roster_history: RosterHistory) {
        let mut inputs = self.inputs.write();
        info!(
            from = inputs.roster_history.version(),
            to = roster_history.version(),
            "Validator roster history updated"
        );
        let window = inputs.window;
        *inputs = Arc::new(ValidatorInputs {
            window,
            roster_history: Arc::new(roster_history),
        });
    }

    pub fn event_window(&self) -> EventWindow {
        self.inputs.read().window
    }

    pub fn roster_history(&self) -> Arc<RosterHistory> {
        self.inputs.read().roster_history.clone()
    }

    pub fn metrics(&self) -> &IntakeMetrics {
        &self.metrics
    }
}
