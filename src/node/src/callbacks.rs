//! Callback dispatch
//!
//! Application callbacks run synchronously on the pipeline's thread. A
//! panicking callback is contained and counted, and a callback that runs past
//! the step budget is reported so the host can move its work elsewhere.

use hgraph_core::traits::ApplicationCallbacks;
use hgraph_core::{ConsensusSnapshot, CoreError, Event, SystemTransaction};
use prometheus::IntCounter;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, warn};

pub struct CallbackDispatcher {
    callbacks: Arc<dyn ApplicationCallbacks>,
    step_budget: Duration,
    panics: Option<IntCounter>,
    over_budget: Option<IntCounter>,
}

impl CallbackDispatcher {
    pub fn new(callbacks: Arc<dyn ApplicationCallbacks>, step_budget: Duration) -> Self {
        Self {
            callbacks,
            step_budget,
            panics: None,
            over_budget: None,
        }
    }

    pub fn with_counters(mut self, panics: IntCounter, over_budget: IntCounter) -> Self {
        self.panics = Some(panics);
        self.over_budget = Some(over_budget);
        self
    }

    pub fn preconsensus_event(&self, event: &Event) {
        self.invoke("on_preconsensus_event", || {
            self.callbacks.on_preconsensus_event(event)
        });
    }

    pub fn snapshot_override(&self, snapshot: &ConsensusSnapshot) {
        self.invoke("on_snapshot_override", || {
            self.callbacks.on_snapshot_override(snapshot)
        });
    }

    pub fn stale_event(&self, event: &Event) {
        self.invoke("on_stale_event", || self.callbacks.on_stale_event(event));
    }

    /// Encode a system transaction with the application encoder
    pub fn encode(&self, tx: &SystemTransaction) -> hgraph_core::Result<Vec<u8>> {
        self.invoke("encode_system_transaction", || {
            self.callbacks.encode_system_transaction(tx)
        })
        .unwrap_or_else(|| {
            Err(CoreError::serialization(
                "system transaction encoder panicked",
            ))
        })
    }

    /// Run `f`, returning `None` if it panicked
    fn invoke<T>(&self, name: &'static str, f: impl FnOnce() -> T) -> Option<T> {
        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(f));
        let elapsed = started.elapsed();

        if elapsed > self.step_budget {
            warn!(
                callback = name,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.step_budget.as_millis() as u64,
                "Application callback exceeded step budget"
            );
            if let Some(counter) = &self.over_budget {
                counter.inc();
            }
        }

        match result {
            Ok(value) => Some(value),
            Err(_) => {
                error!(callback = name, "Application callback panicked");
                if let Some(counter) = &self.panics {
                    counter.inc();
                }
                None
            }
        }
    }
}
