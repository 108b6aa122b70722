//! Step programs: decision trees that resolve field values into a state.
//!
//! A [`StepProgram`] is built from a flat, parent-linked step list by the
//! fix-up pass in [`fixup`]. The pass repairs structural problems instead of
//! rejecting the program, and records each repair as a [`Repair`]:
//!
//! - duplicate step ids are renumbered,
//! - steps not reachable from a root are dropped,
//! - node programs without an unconditional root `Result` get one appended.
//!
//! After fix-up the tree is stored in pre-order with explicit child lists,
//! which is the order the evaluator walks it in.

pub mod fixup;
pub mod library;

use std::fmt;

use gatefield_core::id::{FieldId, ProgramId, StateId, StepId};
use gatefield_core::step::{Step, StepKind};
use serde::Serialize;

pub use library::ProgramLibrary;

/// One structural repair made while building a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "repair", rename_all = "snake_case")]
pub enum Repair {
    /// A step reused an id already taken earlier in the list.
    DuplicateId { old: StepId, new: StepId },
    /// A step whose parent chain never reaches a root was dropped.
    Orphan { step: StepId, parent: StepId },
    /// No unconditional root result existed; one was appended.
    FallbackAppended { state: StateId },
    /// A condition on an unregistered field was dropped with its subtree.
    UnknownField { step: StepId, field: String },
    /// A result or reference step had children, which are never visited.
    UnreachableChildren { step: StepId, count: usize },
    /// A reference names a program that is not in the library.
    MissingProgram { step: StepId, program: ProgramId },
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repair::DuplicateId { old, new } => {
                write!(f, "duplicate step id {old} renumbered to {new}")
            }
            Repair::Orphan { step, parent } => {
                write!(f, "step {step} dropped: parent {parent} is not reachable")
            }
            Repair::FallbackAppended { state } => {
                write!(f, "appended fallback result for state {state}")
            }
            Repair::UnknownField { step, field } => {
                write!(f, "condition step {step} dropped: unknown field '{field}'")
            }
            Repair::UnreachableChildren { step, count } => {
                write!(f, "step {step} is terminal; its {count} child step(s) never run")
            }
            Repair::MissingProgram { step, program } => {
                write!(f, "reference step {step} names missing program {program}")
            }
        }
    }
}

/// A step plus the positions of its children in the program's node list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramNode {
    pub step: Step,
    pub children: Vec<usize>,
}

/// A fixed-up step tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepProgram {
    name: String,
    /// Nodes in pre-order.
    nodes: Vec<ProgramNode>,
    /// Root positions, in evaluation order.
    roots: Vec<usize>,
    repairs: Vec<Repair>,
}

impl StepProgram {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[ProgramNode] {
        &self.nodes
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn node(&self, index: usize) -> Option<&ProgramNode> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Repairs made while building this program.
    pub fn repairs(&self) -> &[Repair] {
        &self.repairs
    }

    pub(crate) fn push_repair(&mut self, repair: Repair) {
        self.repairs.push(repair);
    }

    /// True if some root is an unconditional result, so evaluation always
    /// produces a state.
    pub fn has_fallback(&self) -> bool {
        self.roots
            .iter()
            .any(|i| matches!(self.nodes[*i].step.kind, StepKind::Result { .. }))
    }

    /// The first result state directly under the root, if any.
    pub fn first_root_result(&self) -> Option<StateId> {
        self.roots.iter().find_map(|i| match self.nodes[*i].step.kind {
            StepKind::Result { state } => Some(state),
            _ => None,
        })
    }

    /// Every program referenced by a reference step.
    pub fn references(&self) -> impl Iterator<Item = (StepId, ProgramId)> + '_ {
        self.nodes.iter().filter_map(|node| match node.step.kind {
            StepKind::Reference { program } => Some((node.step.id, program)),
            _ => None,
        })
    }

    /// Every field read by a condition step.
    pub fn condition_fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.nodes.iter().filter_map(|node| match node.step.kind {
            StepKind::Condition { field, .. } => Some(field),
            _ => None,
        })
    }
}
