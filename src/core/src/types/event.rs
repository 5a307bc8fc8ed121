//! Gossiped events
//!
//! An event is immutable once hashed. Parents are referenced by
//! [`EventDescriptor`] so a child never needs its parents resident.

use super::node::{NodeId, Round};
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hash of event content (32-byte BLAKE3 hash)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventHash(pub [u8; 32]);

impl EventHash {
    /// Create a new event hash
    pub fn new(bytes: [u8; 32]) -> Self {
        EventHash(bytes)
    }

    /// Create an event hash from a slice
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != 32 {
            return Err(CoreError::invalid("EventHash must be 32 bytes"));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(EventHash(bytes))
    }

    /// Get the hash as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for EventHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..8])
    }
}

/// Lightweight reference to an event: (hash, creator, birth round)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub hash: EventHash,
    pub creator: NodeId,
    pub birth_round: Round,
}

impl EventDescriptor {
    pub fn new(hash: EventHash, creator: NodeId, birth_round: Round) -> Self {
        Self {
            hash,
            creator,
            birth_round,
        }
    }
}

impl fmt::Display for EventDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}#{}", self.hash, self.creator, self.birth_round)
    }
}

/// A gossiped event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Node that created this event
    pub creator: NodeId,

    /// Round the creator claims the event was born in
    pub birth_round: Round,

    /// Creator-assigned creation time
    pub time_created: DateTime<Utc>,

    /// Previous event by the same creator
    pub self_parent: Option<EventDescriptor>,

    /// Events by other creators this event descends from
    pub other_parents: Vec<EventDescriptor>,

    /// Opaque application and system transactions
    pub transactions: Vec<Vec<u8>>,

    /// BLAKE3 hash of the fields above
    pub hash: EventHash,

    /// Creator's signature over `hash`
    pub signature: Vec<u8>,
}

impl Event {
    /// Compute the canonical hash of the event content
    pub fn compute_hash(
        creator: NodeId,
        birth_round: Round,
        time_created: &DateTime<Utc>,
        self_parent: Option<&EventDescriptor>,
        other_parents: &[EventDescriptor],
        transactions: &[Vec<u8>],
    ) -> EventHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&creator.id().to_le_bytes());
        hasher.update(&birth_round.to_le_bytes());
        hasher.update(&time_created.timestamp().to_le_bytes());
        hasher.update(&time_created.timestamp_subsec_nanos().to_le_bytes());

        match self_parent {
            Some(parent) => {
                hasher.update(&[1]);
                Self::hash_descriptor(&mut hasher, parent);
            }
            None => {
                hasher.update(&[0]);
            }
        }

        hasher.update(&(other_parents.len() as u64).to_le_bytes());
        for parent in other_parents {
            Self::hash_descriptor(&mut hasher, parent);
        }

        hasher.update(&(transactions.len() as u64).to_le_bytes());
        for tx in transactions {
            hasher.update(&(tx.len() as u64).to_le_bytes());
            hasher.update(tx);
        }

        EventHash(*hasher.finalize().as_bytes())
    }

    fn hash_descriptor(hasher: &mut blake3::Hasher, descriptor: &EventDescriptor) {
        hasher.update(descriptor.hash.as_bytes());
        hasher.update(&descriptor.creator.id().to_le_bytes());
        hasher.update(&descriptor.birth_round.to_le_bytes());
    }

    /// Recompute the hash from the event content
    pub fn content_hash(&self) -> EventHash {
        Self::compute_hash(
            self.creator,
            self.birth_round,
            &self.time_created,
            self.self_parent.as_ref(),
            &self.other_parents,
            &self.transactions,
        )
    }

    /// Verify the stored hash matches the content
    pub fn verify_hash(&self) -> Result<()> {
        if self.content_hash() != self.hash {
            return Err(CoreError::invalid(format!("hash mismatch for event {}", self.hash)));
        }
        Ok(())
    }

    /// Set the creator signature
    pub fn sign(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }

    /// Descriptor referencing this event
    pub fn descriptor(&self) -> EventDescriptor {
        EventDescriptor::new(self.hash, self.creator, self.birth_round)
    }

    /// All parent descriptors, self-parent first
    pub fn parents(&self) -> impl Iterator<Item = &EventDescriptor> {
        self.self_parent.iter().chain(self.other_parents.iter())
    }

    /// Total payload size in bytes
    pub fn payload_size(&self) -> usize {
        self.transactions.iter().map(Vec::len).sum()
    }
}

/// Builder for creating events
pub struct EventBuilder {
    creator: NodeId,
    birth_round: Round,
    time_created: Option<DateTime<Utc>>,
    self_parent: Option<EventDescriptor>,
    other_parents: Vec<EventDescriptor>,
    transactions: Vec<Vec<u8>>,
}

impl EventBuilder {
    /// Create a new event builder
    pub fn new(creator: NodeId, birth_round: Round) -> Self {
        EventBuilder {
            creator,
            birth_round,
            time_created: None,
            self_parent: None,
            other_parents: Vec::new(),
            transactions: Vec::new(),
        }
    }

    /// Set creation time (defaults to now)
    pub fn time_created(mut self, time: DateTime<Utc>) -> Self {
        self.time_created = Some(time);
        self
    }

    /// Set the self-parent
    pub fn self_parent(mut self, parent: EventDescriptor) -> Self {
        self.self_parent = Some(parent);
        self
    }

    /// Add an other-parent
    pub fn other_parent(mut self, parent: EventDescriptor) -> Self {
        self.other_parents.push(parent);
        self
    }

    /// Add a transaction
    pub fn transaction(mut self, tx: Vec<u8>) -> Self {
        self.transactions.push(tx);
        self
    }

    /// Replace all transactions
    pub fn transactions(mut self, txs: Vec<Vec<u8>>) -> Self {
        self.transactions = txs;
        self
    }

    /// Build the unsigned event
    pub fn build(self) -> Event {
        let time_created = self.time_created.unwrap_or_else(Utc::now);
        let hash = Event::compute_hash(
            self.creator,
            self.birth_round,
            &time_created,
            self.self_parent.as_ref(),
            &self.other_parents,
            &self.transactions,
        );

        Event {
            creator: self.creator,
            birth_round: self.birth_round,
            time_created,
            self_parent: self.self_parent,
            other_parents: self.other_parents,
            transactions: self.transactions,
            hash,
            signature: Vec::new(),
        }
    }
}
