//! Intake pipeline
//!
//! Wires the intake counter, signature validator and event linker into one
//! stage that gossip sessions feed concurrently, and drives recovery through
//! the reconnect controller. Linked events leave through an unbounded channel
//! towards consensus, in the order they were linked.

use crate::callbacks::CallbackDispatcher;
use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::metrics::PipelineMetrics;
use crate::self_event::SelfEventBuilder;
use crate::stale::StaleEventDetector;
use hgraph_core::traits::{ApplicationCallbacks, Transport};
use hgraph_core::{
    ConsensusSnapshot, CoreError, Event, EventDescriptor, EventHash, EventWindow, NodeId, Roster,
    Round, RosterHistory, SystemTransaction,
};
use hgraph_crypto::{Ed25519Verifier, KeyPair};
use hgraph_dag::{EventLinker, LinkedEvent, MetricsObserver, PruningStats};
use hgraph_intake::{
    DefaultIntakeEventCounter, IntakeEventCounter, NoOpIntakeEventCounter, SignatureValidator,
    ValidationFailure,
};
use hgraph_reconnect::{
    FallenBehindManager, ReconnectController, ReconnectError, ReconnectOutcome, ReconnectState,
    ReconnectTeacher, SignedStateValidator, StateDataSource,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

/// What happened to a submitted event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Linked and sent downstream
    Accepted,
    /// Refused because a reconnect is running
    Suspended,
    /// Failed authentication
    Invalid(ValidationFailure),
    /// Ancient, duplicate or rejected by the anomaly policy
    Dropped,
}

/// Clears the suspension flag however the reconnect future ends
struct Suspension<'a>(&'a AtomicBool);

impl Drop for Suspension<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct IntakePipeline {
    node_id: NodeId,
    rounds_non_ancient: u64,
    socket_timeout: Duration,

    counter: Arc<dyn IntakeEventCounter>,
    validator: SignatureValidator,
    linker: EventLinker,
    reconnect: ReconnectController,
    store: Arc<dyn StateDataSource>,

    callbacks: CallbackDispatcher,
    stale: StaleEventDetector,
    self_events: Option<SelfEventBuilder>,

    suspended: AtomicBool,

    /// Serialises window changes across validator and linker
    window_lock: Mutex<()>,

    /// Serialises roster history installs so each diff is taken against
    /// the history it replaces
    roster_lock: Mutex<()>,

    output: UnboundedSender<Arc<LinkedEvent>>,
    metrics: PipelineMetrics,
}

impl IntakePipeline {
    /// Build a pipeline and the receiver of linked events
    pub fn new(
        config: &NodeConfig,
        roster_history: RosterHistory,
        transport: Arc<dyn Transport>,
        store: Arc<dyn StateDataSource>,
        callbacks: Arc<dyn ApplicationCallbacks>,
    ) -> Result<(Self, UnboundedReceiver<Arc<LinkedEvent>>)> {
        config.validate()?;
        let node_id = config.node_id();
        let metrics = PipelineMetrics::new(&config.metrics.namespace)?;

        let counter: Arc<dyn IntakeEventCounter> = if config.intake.counter_enabled {
            Arc::new(
                DefaultIntakeEventCounter::new()
                    .with_underflow_counter(metrics.intake.counter_underflow.clone()),
            )
        } else {
            Arc::new(NoOpIntakeEventCounter)
        };

        let verifier = Arc::new(Ed25519Verifier);
        let validator =
            SignatureValidator::new(roster_history.clone(), verifier.clone(), metrics.intake.clone());
        let linker = EventLinker::with_observer(
            config.linker,
            Arc::new(MetricsObserver::new(metrics.linker.clone())),
        );

        let peers: Vec<(NodeId, u64)> = roster_history
            .current()
            .entries()
            .map(|entry| (entry.node_id, entry.weight))
            .collect();
        let mut fallen_behind = FallenBehindManager::with_threshold(
            node_id,
            peers,
            config.fallen_behind_threshold(),
            config.fallen_behind_mode(),
        );
        if let Some(min) = config.fallen_behind.min_reporters {
            fallen_behind = fallen_behind.with_min_reporters(min);
        }

        let signed_state = SignedStateValidator::with_threshold(
            verifier,
            Arc::new(config.reconnect.signature_threshold),
        );
        let reconnect = ReconnectController::new(
            config.reconnect_config(),
            transport,
            Arc::clone(&store),
            Arc::new(signed_state),
            Arc::new(roster_history),
            Arc::new(fallen_behind),
            metrics.reconnect.clone(),
        );

        let dispatcher = CallbackDispatcher::new(callbacks, config.callback_budget())
            .with_counters(
                metrics.callback_panics.clone(),
                metrics.callback_over_budget.clone(),
            );

        let (output, events) = unbounded_channel();

        info!(
            node = %node_id,
            counter_enabled = config.intake.counter_enabled,
            rounds_non_ancient = config.intake.rounds_non_ancient,
            "Intake pipeline created"
        );

        Ok((
            Self {
                node_id,
                rounds_non_ancient: config.intake.rounds_non_ancient,
                socket_timeout: config.reconnect_config().socket_timeout,
                counter,
                validator,
                linker,
                reconnect,
                store,
                callbacks: dispatcher,
                stale: StaleEventDetector::new(),
                self_events: None,
                suspended: AtomicBool::new(false),
                window_lock: Mutex::new(()),
                roster_lock: Mutex::new(()),
                output,
                metrics,
            },
            events,
        ))
    }

    /// Enable self-event creation with this node's signing key
    pub fn with_signing_key(mut self, keys: KeyPair) -> Self {
        self.self_events = Some(SelfEventBuilder::new(self.node_id, keys));
        self
    }

    /// Admit one event received from `peer`
    pub fn submit(&self, peer: NodeId, event: Event) -> SubmitOutcome {
        self.counter.enter(peer);
        let outcome = self.admit(event);
        self.counter.exit(peer);
        outcome
    }

    /// Admit a burst from `peer`, validating signatures in parallel
    pub fn submit_batch(&self, peer: NodeId, events: Vec<Event>) -> Vec<SubmitOutcome> {
        let count = events.len();
        for _ in 0..count {
            self.counter.enter(peer);
        }

        let outcomes = if self.is_suspended() {
            self.metrics.suspended_drops.inc_by(count as u64);
            vec![SubmitOutcome::Suspended; count]
        } else {
            let checks = self.validator.check_batch(&events);
            events
                .into_iter()
                .zip(checks)
                .map(|(event, check)| match check {
                    Ok(()) => self.link(event),
                    Err(failure) => SubmitOutcome::Invalid(failure),
                })
                .collect()
        };

        for _ in 0..count {
            self.counter.exit(peer);
        }
        outcomes
    }

    /// Create, sign and admit a self event
    pub fn create_self_event(
        &self,
        other_parents: Vec<EventDescriptor>,
        system_transactions: &[SystemTransaction],
        transactions: Vec<Vec<u8>>,
    ) -> Result<(Event, SubmitOutcome)> {
        let builder = self
            .self_events
            .as_ref()
            .ok_or_else(|| CoreError::configuration("pipeline has no signing key"))?;

        let event = builder.build(
            &self.linker.event_window(),
            other_parents,
            system_transactions,
            transactions,
            &self.callbacks,
        )?;
        let outcome = self.submit(self.node_id, event.clone());
        Ok((event, outcome))
    }

    fn admit(&self, event: Event) -> SubmitOutcome {
        if self.is_suspended() {
            debug!(event = %event.hash, "Intake suspended, refusing event");
            self.metrics.suspended_drops.inc();
            return SubmitOutcome::Suspended;
        }

        match self.validator.check(&event) {
            Ok(()) => self.link(event),
            Err(failure) => SubmitOutcome::Invalid(failure),
        }
    }

    fn link(&self, event: Event) -> SubmitOutcome {
        let linked = match self.linker.link_next(event) {
            Some(linked) => linked,
            None => return SubmitOutcome::Dropped,
        };

        if linked.creator() == self.node_id {
            self.stale.track(linked.event());
        }
        self.callbacks.preconsensus_event(linked.event());

        if self.output.send(linked).is_err() {
            debug!("Linked event receiver dropped");
        }
        SubmitOutcome::Accepted
    }

    /// Move the event window forward and prune what became ancient
    pub fn set_event_window(&self, window: EventWindow) -> Result<PruningStats> {
        let (stats, stale_events) = {
            let _guard = self.window_lock.lock();

            let stats = self.linker.set_event_window(window).map_err(|e| {
                error!(%window, error = %e, "Linker rejected window");
                NodeError::from(e)
            })?;
            self.validator.set_event_window(window)?;

            (stats, self.stale.expire(&window))
        };

        for event in &stale_events {
            self.metrics.stale_events.inc();
            self.callbacks.stale_event(event);
        }
        Ok(stats)
    }

    /// Window after `latest_consensus_round` reached consensus
    pub fn advance_to_round(&self, latest_consensus_round: Round) -> Result<PruningStats> {
        self.set_event_window(EventWindow::from_latest_round(
            latest_consensus_round,
            self.rounds_non_ancient,
        ))
    }

    /// Consensus reached these events; self events among them are no longer
    /// candidates for staleness
    pub fn consensus_reached<'a>(&self, hashes: impl IntoIterator<Item = &'a EventHash>) {
        for hash in hashes {
            self.stale.consensus_reached(hash);
        }
    }

    /// Install a new roster history everywhere it is read
    pub fn update_roster_history(&self, roster_history: RosterHistory) {
        let _guard = self.roster_lock.lock();
        let previous = self.validator.roster_history();
        let (added, removed) = roster_diff(previous.current(), roster_history.current());

        self.fallen_behind().add_remove_peers(&added, &removed);
        self.reconnect
            .update_roster_history(Arc::new(roster_history.clone()));
        self.validator.update_roster_history(roster_history);
    }

    /// A peer says we are behind. Returns whether the report was new.
    pub fn report_behind(&self, peer: NodeId) -> bool {
        self.fallen_behind().report_behind(peer)
    }

    pub fn has_fallen_behind(&self) -> bool {
        self.fallen_behind().has_fallen_behind()
    }

    pub fn should_reconnect_from(&self, peer: &NodeId) -> bool {
        self.fallen_behind().should_reconnect_from(peer)
    }

    /// Recover state from a teacher.
    ///
    /// Intake is suspended for the duration. On success every piece of
    /// intake state restarts at the received snapshot's round.
    pub async fn reconnect(&self) -> Result<ReconnectOutcome> {
        if self.suspended.swap(true, Ordering::SeqCst) {
            return Err(ReconnectError::AlreadyInProgress.into());
        }
        let _suspension = Suspension(&self.suspended);
        info!(node = %self.node_id, "Intake suspended for reconnect");

        let outcome = self.reconnect.reconnect().await?;
        self.override_snapshot(&outcome.learned.snapshot);

        info!(
            node = %self.node_id,
            teacher = %outcome.learned.teacher,
            round = outcome.learned.snapshot.round,
            "Intake resumed after reconnect"
        );
        Ok(outcome)
    }

    /// Restart intake at `snapshot`, as after a reconnect or restart
    pub fn override_snapshot(&self, snapshot: &ConsensusSnapshot) {
        let window = EventWindow::at_snapshot(snapshot.round);
        {
            let _guard = self.window_lock.lock();
            self.linker.clear(window);
            self.validator.reset_event_window(window);
        }
        self.counter.reset();
        self.stale.clear();
        if let Some(builder) = &self.self_events {
            builder.reset();
        }

        info!(round = snapshot.round, %window, "Consensus snapshot overridden");
        self.callbacks.snapshot_override(snapshot);
    }

    /// Teacher serving this node's committed state to other nodes
    pub fn teacher(&self) -> ReconnectTeacher {
        ReconnectTeacher::new(self.node_id, Arc::clone(&self.store), self.socket_timeout)
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn event_window(&self) -> EventWindow {
        self.linker.event_window()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        self.reconnect.state()
    }

    pub fn fallen_behind(&self) -> &Arc<FallenBehindManager> {
        self.reconnect.fallen_behind()
    }

    pub fn linker(&self) -> &EventLinker {
        &self.linker
    }

    pub fn validator(&self) -> &SignatureValidator {
        &self.validator
    }

    pub fn counter(&self) -> &Arc<dyn IntakeEventCounter> {
        &self.counter
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }
}

/// Peers added (or reweighted) and removed between two rosters
fn roster_diff(previous: &Roster, next: &Roster) -> (Vec<(NodeId, u64)>, Vec<NodeId>) {
    let before: BTreeMap<NodeId, u64> = previous
        .entries()
        .map(|entry| (entry.node_id, entry.weight))
        .collect();

    let added: Vec<(NodeId, u64)> = next
        .entries()
        .filter(|entry| before.get(&entry.node_id) != Some(&entry.weight))
        .map(|entry| (entry.node_id, entry.weight))
        .collect();
    let removed: Vec<NodeId> = before
        .keys()
        .filter(|node| !next.contains(*node))
        .copied()
        .collect();

    if !added.is_empty() || !removed.is_empty() {
        warn!(
            added = added.len(),
            removed = removed.len(),
            "Roster membership changed"
        );
    }
    (added, removed)
}
