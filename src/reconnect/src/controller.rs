//! Reconnect Controller
//!
//! Orchestrates recovery once the node has fallen behind: picks teachers,
//! runs one learner session at a time under a bounded timeout and signals a
//! stalled recovery after every eligible teacher has failed.

use crate::error::{ReconnectError, Result};
use crate::fallen_behind::FallenBehindManager;
use crate::learner::{LearnedState, ReconnectLearner};
use crate::metrics::ReconnectMetrics;
use crate::signed_state::SignedStateValidator;
use crate::store::StateDataSource;
use dashmap::DashMap;
use hgraph_core::traits::Transport;
use hgraph_core::{NodeId, Round, RosterHistory};
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Progress of the current recovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectState {
    /// No recovery running
    Idle,

    /// A teacher was chosen and is being contacted
    TeacherSelected { teacher: NodeId },

    /// State is being pulled from the teacher
    Transferring { teacher: NodeId },

    /// State from the teacher was committed
    Succeeded { teacher: NodeId, round: Round },

    /// The session with the teacher failed
    Failed { teacher: NodeId, reason: String },
}

/// Host-side observer of recovery progress
pub trait ReconnectListener: Send + Sync {
    fn state_changed(&self, _state: &ReconnectState) {}

    /// Every eligible teacher failed. Carries each teacher with its failure.
    fn recovery_stalled(&self, _failures: &[(NodeId, String)]) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReconnectListener;

impl ReconnectListener for NoopReconnectListener {}

/// Configuration for reconnect sessions
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Limit on waiting for any single message (default: 5s)
    pub socket_timeout: Duration,

    /// Limit on a whole session with one teacher (default: 60s)
    pub session_timeout: Duration,

    /// How long a failed teacher is tried last (default: 60s)
    pub teacher_cooldown: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            socket_timeout: Duration::from_secs(5),
            session_timeout: Duration::from_secs(60),
            teacher_cooldown: Duration::from_secs(60),
        }
    }
}

/// Result of a successful recovery
#[derive(Debug, Clone)]
pub struct ReconnectOutcome {
    pub learned: LearnedState,

    /// Sessions run, including the successful one
    pub attempts: usize,
}

/// Reconnect controller
pub struct ReconnectController {
    node_id: NodeId,
    transport: Arc<dyn Transport>,
    store: Arc<dyn StateDataSource>,
    validator: Arc<SignedStateValidator>,
    roster_history: RwLock<Arc<RosterHistory>>,
    fallen_behind: Arc<FallenBehindManager>,
    config: ReconnectConfig,
    metrics: ReconnectMetrics,
    listener: Arc<dyn ReconnectListener>,

    state: RwLock<ReconnectState>,

    /// Teacher -> time of its last failure
    recent_failures: DashMap<NodeId, Instant>,

    /// Cancellation token of the running recovery; `None` when idle
    session: Mutex<Option<CancellationToken>>,
}

/// Marks a recovery as running until dropped
struct SessionGuard<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
    token: CancellationToken,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

impl ReconnectController {
    pub fn new(
        config: ReconnectConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn StateDataSource>,
        validator: Arc<SignedStateValidator>,
        roster_history: Arc<RosterHistory>,
        fallen_behind: Arc<FallenBehindManager>,
        metrics: ReconnectMetrics,
    ) -> Self {
        Self {
            node_id: transport.local_node_id(),
            transport,
            store,
            validator,
            roster_history: RwLock::new(roster_history),
            fallen_behind,
            config,
            metrics,
            listener: Arc::new(NoopReconnectListener),
            state: RwLock::new(ReconnectState::Idle),
            recent_failures: DashMap::new(),
            session: Mutex::new(None),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ReconnectListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn state(&self) -> ReconnectState {
        self.state.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn fallen_behind(&self) -> &Arc<FallenBehindManager> {
        &self.fallen_behind
    }

    /// Replace the roster history used to check offered states
    pub fn update_roster_history(&self, roster_history: Arc<RosterHistory>) {
        *self.roster_history.write() = roster_history;
    }

    /// Cancel the running recovery, if any
    pub fn cancel(&self) {
        if let Some(token) = self.session.lock().as_ref() {
            token.cancel();
        }
    }

    /// Claims the session and installs its token in one step, so a
    /// `cancel` can never land between the two.
    fn begin_session(&self) -> Result<SessionGuard<'_>> {
        let mut slot = self.session.lock();
        if slot.is_some() {
            return Err(ReconnectError::AlreadyInProgress);
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Ok(SessionGuard {
            slot: &self.session,
            token,
        })
    }

    /// Recover from a teacher.
    ///
    /// Only one recovery runs at a time; a concurrent call fails with
    /// [`ReconnectError::AlreadyInProgress`].
    pub async fn reconnect(&self) -> Result<ReconnectOutcome> {
        let session = self.begin_session()?;
        let token = session.token.clone();

        if !self.fallen_behind.has_fallen_behind() {
            return Err(ReconnectError::NotBehind);
        }

        let candidates = self.ordered_candidates();
        if candidates.is_empty() {
            warn!(node = %self.node_id, "Fallen behind but no peer is eligible to teach");
            return Err(ReconnectError::NoEligibleTeacher);
        }

        info!(
            node = %self.node_id,
            candidates = candidates.len(),
            "Starting reconnect"
        );

        let mut failures: Vec<(NodeId, String)> = Vec::new();
        for teacher in candidates {
            self.set_state(ReconnectState::TeacherSelected { teacher });
            self.metrics.attempts.inc();

            let result = tokio::select! {
                _ = token.cancelled() => Err(ReconnectError::Cancelled),
                r = timeout(self.config.session_timeout, self.attempt(teacher)) => {
                    r.unwrap_or(Err(ReconnectError::Timeout))
                }
            };

            match result {
                Ok(learned) => {
                    self.metrics.successes.inc();
                    self.metrics
                        .buckets_transferred
                        .inc_by(learned.buckets_transferred as u64);
                    self.recent_failures.remove(&teacher);
                    self.fallen_behind.reset();
                    self.set_state(ReconnectState::Succeeded {
                        teacher,
                        round: learned.snapshot.round,
                    });
                    return Ok(ReconnectOutcome {
                        learned,
                        attempts: failures.len() + 1,
                    });
                }
                Err(e) => {
                    self.metrics.failures.inc();
                    self.recent_failures.insert(teacher, Instant::now());
                    self.set_state(ReconnectState::Failed {
                        teacher,
                        reason: e.to_string(),
                    });

                    if !e.is_retryable() {
                        error!(teacher = %teacher, error = %e, "Reconnect aborted");
                        return Err(e);
                    }
                    warn!(teacher = %teacher, error = %e, "Reconnect attempt failed");
                    failures.push((teacher, e.to_string()));
                }
            }
        }

        self.metrics.stalls.inc();
        error!(
            node = %self.node_id,
            attempts = failures.len(),
            "Recovery stalled: every eligible teacher failed"
        );
        self.listener.recovery_stalled(&failures);
        Err(ReconnectError::Stalled {
            attempts: failures.len(),
        })
    }

    async fn attempt(&self, teacher: NodeId) -> Result<LearnedState> {
        let mut conn = self.transport.connect(teacher).await?;
        self.set_state(ReconnectState::Transferring { teacher });

        let roster_history = self.roster_history.read().clone();
        let learner = ReconnectLearner::new(
            self.node_id,
            Arc::clone(&self.store),
            Arc::clone(&self.validator),
            roster_history,
            self.config.socket_timeout,
        );

        let result = learner.run(conn.as_mut()).await;

        // Closed off the session clock: a committed state outlives a slow close
        tokio::spawn(async move {
            if let Err(e) = conn.close().await {
                debug!(teacher = %teacher, error = %e, "Closing reconnect connection failed");
            }
        });
        result
    }

    /// Eligible teachers in random order, recently failed ones last
    fn ordered_candidates(&self) -> Vec<NodeId> {
        let mut candidates = self.fallen_behind.reconnect_candidates();
        candidates.shuffle(&mut rand::thread_rng());

        let cooldown = self.config.teacher_cooldown;
        candidates.sort_by_key(|teacher| match self.recent_failures.get(teacher) {
            Some(at) if at.elapsed() < cooldown => Some(*at),
            _ => None,
        });
        candidates
    }

    fn set_state(&self, state: ReconnectState) {
        debug!(node = %self.node_id, state = ?state, "Reconnect state changed");
        *self.state.write() = state.clone();
        self.listener.state_changed(&state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_transport::MemoryTransport;
    use crate::store::InMemoryStateStore;
    use hgraph_crypto::Ed25519Verifier;
    use prometheus::Registry;

    fn controller(peers: &[u64]) -> ReconnectController {
        let fallen_behind = Arc::new(FallenBehindManager::new(
            NodeId(0),
            peers.iter().map(|p| (NodeId(*p), 1)),
        ));
        let metrics = ReconnectMetrics::register(&Registry::new(), "test").unwrap();

        ReconnectController::new(
            ReconnectConfig::default(),
            Arc::new(MemoryTransport::new(NodeId(0))),
            Arc::new(InMemoryStateStore::empty(3).unwrap()),
            Arc::new(SignedStateValidator::new(Arc::new(Ed25519Verifier))),
            Arc::new(RosterHistory::single(1, 1, hgraph_core::Roster::new(Vec::new()))),
            fallen_behind,
            metrics,
        )
    }

    #[tokio::test]
    async fn test_not_behind_is_refused() {
        let controller = controller(&[1, 2]);
        assert!(matches!(
            controller.reconnect().await,
            Err(ReconnectError::NotBehind)
        ));
        assert_eq!(controller.state(), ReconnectState::Idle);
    }

    #[test]
    fn test_recently_failed_teachers_are_tried_last() {
        let controller = controller(&[1, 2, 3]);
        for peer in [1, 2, 3] {
            controller.fallen_behind().report_behind(NodeId(peer));
        }
        controller.recent_failures.insert(NodeId(2), Instant::now());

        for _ in 0..10 {
            let order = controller.ordered_candidates();
            assert_eq!(order.len(), 3);
            assert_eq!(order[2], NodeId(2));
        }
    }

    #[test]
    fn test_cancel_reaches_a_session_as_soon_as_it_is_claimed() {
        let controller = controller(&[1]);
        let session = controller.begin_session().unwrap();
        assert!(controller.is_running());

        controller.cancel();
        assert!(session.token.is_cancelled());

        drop(session);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_cancel_while_idle_does_not_leak_into_next_session() {
        let controller = controller(&[1]);
        controller.cancel();

        let session = controller.begin_session().unwrap();
        assert!(!session.token.is_cancelled());
        assert!(matches!(
            controller.begin_session(),
            Err(ReconnectError::AlreadyInProgress)
        ));
    }
}
