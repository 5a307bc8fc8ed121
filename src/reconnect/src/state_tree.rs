//! Merkle state tree
//!
//! A complete binary tree of fixed depth stored as a heap array: node `i`
//! has children `2i + 1` and `2i + 2`, and the `2^depth` leaves are buckets
//! of key/value entries. A key lives in the bucket selected by the leading
//! `depth` bits of its BLAKE3 hash.
//!
//! Because node positions are fixed, two trees of equal depth can be
//! compared level by level by index, which is what the reconnect diff does.

use crate::error::{ReconnectError, Result};
use hgraph_core::{ConsensusSnapshot, Round};
use hgraph_crypto::hash::{hash_bytes, hash_pair, EMPTY_HASH};
use std::collections::BTreeMap;

/// Key under which the consensus snapshot is stored
pub const SNAPSHOT_KEY: &[u8] = b"\0platform/consensus_snapshot";

/// Largest supported depth (one million leaves)
pub const MAX_DEPTH: u8 = 20;

/// Entries of one leaf
pub type Bucket = BTreeMap<Vec<u8>, Vec<u8>>;

/// Fixed-depth Merkle tree over key/value buckets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTree {
    depth: u8,
    nodes: Vec<[u8; 32]>,
    buckets: Vec<Bucket>,
}

impl StateTree {
    pub fn new(depth: u8) -> Result<Self> {
        if depth == 0 || depth > MAX_DEPTH {
            return Err(ReconnectError::InvalidTree(format!(
                "depth must be between 1 and {}, got {}",
                MAX_DEPTH, depth
            )));
        }

        let leaves = 1usize << depth;
        Ok(Self {
            depth,
            nodes: vec![EMPTY_HASH; 2 * leaves - 1],
            buckets: vec![Bucket::new(); leaves],
        })
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn leaf_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Heap index of the first leaf
    pub fn first_leaf_index(&self) -> usize {
        self.buckets.len() - 1
    }

    pub fn is_leaf_index(&self, index: usize) -> bool {
        index >= self.first_leaf_index() && index < self.nodes.len()
    }

    pub fn children(index: usize) -> (usize, usize) {
        (2 * index + 1, 2 * index + 2)
    }

    pub fn root_hash(&self) -> [u8; 32] {
        self.nodes[0]
    }

    pub fn node_hash(&self, index: usize) -> Option<[u8; 32]> {
        self.nodes.get(index).copied()
    }

    /// Leaf number (0-based, left to right) holding `key`
    pub fn leaf_for_key(&self, key: &[u8]) -> usize {
        let digest = hash_bytes(key);
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(prefix) >> (64 - self.depth as u32)) as usize
    }

    pub fn get(&self, key: &[u8]) -> Option<&Vec<u8>> {
        self.buckets[self.leaf_for_key(key)].get(key)
    }

    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) -> Option<Vec<u8>> {
        let leaf = self.leaf_for_key(&key);
        let previous = self.buckets[leaf].insert(key, value);
        self.rehash_path(leaf);
        previous
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let leaf = self.leaf_for_key(key);
        let removed = self.buckets[leaf].remove(key);
        if removed.is_some() {
            self.rehash_path(leaf);
        }
        removed
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Bucket::is_empty)
    }

    pub fn bucket(&self, leaf: usize) -> Option<&Bucket> {
        self.buckets.get(leaf)
    }

    /// Replace a whole bucket, rejecting entries that do not belong to it
    pub fn set_bucket(&mut self, leaf: usize, bucket: Bucket) -> Result<()> {
        if leaf >= self.buckets.len() {
            return Err(ReconnectError::InvalidTree(format!(
                "leaf {} out of range ({} leaves)",
                leaf,
                self.buckets.len()
            )));
        }
        if let Some(stray) = bucket.keys().find(|key| self.leaf_for_key(key) != leaf) {
            return Err(ReconnectError::InvalidTree(format!(
                "key of {} bytes does not belong to leaf {}",
                stray.len(),
                leaf
            )));
        }

        self.buckets[leaf] = bucket;
        self.rehash_path(leaf);
        Ok(())
    }

    /// Store the consensus snapshot under the platform key
    pub fn set_snapshot(&mut self, snapshot: &ConsensusSnapshot) -> Result<()> {
        let bytes = snapshot.to_bytes()?;
        self.insert(SNAPSHOT_KEY.to_vec(), bytes);
        Ok(())
    }

    pub fn snapshot(&self) -> Result<Option<ConsensusSnapshot>> {
        match self.get(SNAPSHOT_KEY) {
            Some(bytes) => Ok(Some(ConsensusSnapshot::from_bytes(bytes)?)),
            None => Ok(None),
        }
    }

    /// Round of the stored snapshot, zero when there is none
    pub fn snapshot_round(&self) -> Result<Round> {
        Ok(self.snapshot()?.map(|s| s.round).unwrap_or(0))
    }

    fn leaf_hash(bucket: &Bucket) -> [u8; 32] {
        if bucket.is_empty() {
            return EMPTY_HASH;
        }

        let mut buf = Vec::new();
        for (key, value) in bucket {
            buf.extend_from_slice(&(key.len() as u64).to_le_bytes());
            buf.extend_from_slice(key);
            buf.extend_from_slice(&(value.len() as u64).to_le_bytes());
            buf.extend_from_slice(value);
        }
        hash_bytes(&buf)
    }

    fn rehash_path(&mut self, leaf: usize) {
        let mut index = self.first_leaf_index() + leaf;
        self.nodes[index] = Self::leaf_hash(&self.buckets[leaf]);

        while index > 0 {
            index = (index - 1) / 2;
            let (left, right) = Self::children(index);
            self.nodes[index] = hash_pair(&self.nodes[left], &self.nodes[right]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_empty_tree_root() {
        let tree = StateTree::new(4).unwrap();
        assert_eq!(tree.root_hash(), EMPTY_HASH);
        assert_eq!(tree.leaf_count(), 16);
        assert_eq!(tree.node_count(), 31);
        assert!(tree.is_leaf_index(15));
        assert!(!tree.is_leaf_index(14));
    }

    #[test]
    fn test_invalid_depth() {
        assert!(StateTree::new(0).is_err());
        assert!(StateTree::new(MAX_DEPTH + 1).is_err());
    }

    #[test]
    fn test_insert_changes_root_and_remove_restores() {
        let mut tree = StateTree::new(3).unwrap();
        tree.insert(b"account".to_vec(), b"100".to_vec());
        assert_ne!(tree.root_hash(), EMPTY_HASH);
        assert_eq!(tree.get(b"account"), Some(&b"100".to_vec()));

        tree.remove(b"account");
        assert_eq!(tree.root_hash(), EMPTY_HASH);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_root_independent_of_insert_order() {
        let mut a = StateTree::new(5).unwrap();
        let mut b = StateTree::new(5).unwrap();
        for i in 0..50u32 {
            a.insert(i.to_le_bytes().to_vec(), vec![i as u8]);
        }
        for i in (0..50u32).rev() {
            b.insert(i.to_le_bytes().to_vec(), vec![i as u8]);
        }
        assert_eq!(a.root_hash(), b.root_hash());
    }

    #[test]
    fn test_snapshot_round_trip_through_tree() {
        let mut tree = StateTree::new(4).unwrap();
        assert_eq!(tree.snapshot_round().unwrap(), 0);

        tree.set_snapshot(&ConsensusSnapshot::new(77, Utc::now())).unwrap();
        assert_eq!(tree.snapshot_round().unwrap(), 77);
    }

    #[test]
    fn test_set_bucket_rejects_stray_keys() {
        let mut source = StateTree::new(4).unwrap();
        source.insert(b"k".to_vec(), b"v".to_vec());
        let leaf = source.leaf_for_key(b"k");
        let bucket = source.bucket(leaf).unwrap().clone();

        let mut target = StateTree::new(4).unwrap();
        assert!(target.set_bucket((leaf + 1) % 16, bucket.clone()).is_err());
        target.set_bucket(leaf, bucket).unwrap();
        assert_eq!(target.root_hash(), source.root_hash());
    }
}
