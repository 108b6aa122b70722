//! Stable ID newtypes for fields, states, steps, programs and owners.
//!
//! Interned ids ([`FieldId`], [`StateId`], [`ProgramId`]) are dense `u32`
//! indices handed out by the [`Registry`](crate::registry::Registry) in
//! first-seen order. They are only meaningful within the registration epoch
//! that produced them and are never persisted.
//!
//! [`FieldHandle`] is different: it addresses a live field slot in the graph
//! arena. Slots are reused after removal, so a handle carries the generation
//! of the slot it was issued for and goes stale once that slot is freed.

use std::fmt;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Interned field-definition identifier (e.g. "Hovered", "Selected").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldId(pub u32);

/// Interned state identifier (e.g. "Idle", "Pressed").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateId(pub u32);

/// Step identity within one step program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StepId(pub u32);

/// Interned identity of a reusable step program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProgramId(pub u32);

/// The entity owning a group of fields (a UI element, a game object...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub u32);

/// Generation-checked handle to a field slot in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldHandle {
    /// Arena slot index.
    pub index: u32,
    /// Generation of the slot when this handle was issued.
    pub generation: u32,
}

impl FieldHandle {
    /// Creates a handle for the given slot index and generation.
    pub fn new(index: u32, generation: u32) -> Self {
        FieldHandle { index, generation }
    }

    /// Returns the petgraph index of the slot this handle points into.
    ///
    /// The index alone does not prove the handle is live; callers must
    /// compare generations.
    pub fn node_index(self) -> NodeIndex<u32> {
        NodeIndex::new(self.index as usize)
    }
}

// Display implementations -- just print the inner value.

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FieldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}
