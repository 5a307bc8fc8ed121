//! Linked event nodes
//!
//! Parents are referenced by descriptor rather than by owning pointer.
//! Pruning a parent never invalidates a child; the child's link simply stops
//! resolving in the working set.

use hgraph_core::{Event, EventDescriptor, EventHash, NodeId, Round};
use std::fmt;

/// Outcome of resolving one parent descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLink {
    /// Parent resolved and passed every structural check
    Linked(EventDescriptor),

    /// Parent was not in the working set
    Missing(EventDescriptor),

    /// Parent resolved but a structural check failed and policy severed it
    Severed(EventDescriptor),
}

impl ParentLink {
    /// Descriptor as claimed by the child
    pub fn descriptor(&self) -> &EventDescriptor {
        match self {
            ParentLink::Linked(d) | ParentLink::Missing(d) | ParentLink::Severed(d) => d,
        }
    }

    pub fn is_linked(&self) -> bool {
        matches!(self, ParentLink::Linked(_))
    }
}

impl fmt::Display for ParentLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentLink::Linked(d) => write!(f, "linked({})", d),
            ParentLink::Missing(d) => write!(f, "missing({})", d),
            ParentLink::Severed(d) => write!(f, "severed({})", d),
        }
    }
}

/// An event admitted into the linker's working set
#[derive(Debug, Clone)]
pub struct LinkedEvent {
    event: Event,
    self_parent: Option<ParentLink>,
    other_parents: Vec<ParentLink>,
}

impl LinkedEvent {
    pub(crate) fn new(
        event: Event,
        self_parent: Option<ParentLink>,
        other_parents: Vec<ParentLink>,
    ) -> Self {
        Self {
            event,
            self_parent,
            other_parents,
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn into_event(self) -> Event {
        self.event
    }

    pub fn hash(&self) -> EventHash {
        self.event.hash
    }

    pub fn creator(&self) -> NodeId {
        self.event.creator
    }

    pub fn birth_round(&self) -> Round {
        self.event.birth_round
    }

    pub fn descriptor(&self) -> EventDescriptor {
        self.event.descriptor()
    }

    pub fn self_parent(&self) -> Option<&ParentLink> {
        self.self_parent.as_ref()
    }

    pub fn other_parents(&self) -> &[ParentLink] {
        &self.other_parents
    }

    /// All parent links, self-parent first
    pub fn parent_links(&self) -> impl Iterator<Item = &ParentLink> {
        self.self_parent.iter().chain(self.other_parents.iter())
    }

    /// Descriptors of parents that resolved cleanly
    pub fn linked_parents(&self) -> impl Iterator<Item = &EventDescriptor> {
        self.parent_links()
            .filter(|link| link.is_linked())
            .map(ParentLink::descriptor)
    }

    pub fn missing_parent_count(&self) -> usize {
        self.parent_links()
            .filter(|link| matches!(link, ParentLink::Missing(_)))
            .count()
    }

    pub fn is_fully_linked(&self) -> bool {
        self.parent_links().all(ParentLink::is_linked)
    }
}
