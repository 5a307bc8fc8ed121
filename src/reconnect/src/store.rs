//! State data source
//!
//! The learner never mutates committed state. It takes a working copy,
//! applies the transfer there, and commits only after the copy is fully
//! validated, so a failed or partial transfer leaves the committed state
//! untouched.

use crate::error::{ReconnectError, Result};
use crate::state_tree::StateTree;
use hgraph_core::NodeSignature;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// Committed state together with the signatures attesting to its root
#[derive(Debug, Clone)]
pub struct SavedState {
    pub tree: Arc<StateTree>,
    pub signatures: Vec<NodeSignature>,
}

/// Storage backing the reconnect protocol
pub trait StateDataSource: Send + Sync {
    /// Latest committed state
    fn snapshot(&self) -> Result<SavedState>;

    /// Private mutable copy of the committed tree
    fn working_copy(&self) -> Result<StateTree>;

    /// Atomically replace the committed state
    fn commit(&self, tree: StateTree, signatures: Vec<NodeSignature>) -> Result<()>;
}

/// Process-local state store
pub struct InMemoryStateStore {
    current: RwLock<SavedState>,
}

impl InMemoryStateStore {
    pub fn new(tree: StateTree, signatures: Vec<NodeSignature>) -> Self {
        Self {
            current: RwLock::new(SavedState {
                tree: Arc::new(tree),
                signatures,
            }),
        }
    }

    /// Store holding an empty tree
    pub fn empty(depth: u8) -> Result<Self> {
        Ok(Self::new(StateTree::new(depth)?, Vec::new()))
    }

    pub fn root_hash(&self) -> [u8; 32] {
        self.current.read().tree.root_hash()
    }
}

impl StateDataSource for InMemoryStateStore {
    fn snapshot(&self) -> Result<SavedState> {
        Ok(self.current.read().clone())
    }

    fn working_copy(&self) -> Result<StateTree> {
        Ok(self.current.read().tree.as_ref().clone())
    }

    fn commit(&self, tree: StateTree, signatures: Vec<NodeSignature>) -> Result<()> {
        let round = tree.snapshot_round()?;
        let mut current = self.current.write();

        if current.tree.depth() != tree.depth() {
            return Err(ReconnectError::Store(format!(
                "depth mismatch: committed {} vs new {}",
                current.tree.depth(),
                tree.depth()
            )));
        }

        *current = SavedState {
            tree: Arc::new(tree),
            signatures,
        };
        info!(round, "State committed");
        Ok(())
    }
}
