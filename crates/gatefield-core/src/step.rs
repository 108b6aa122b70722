//! Decision steps: the nodes of a state-resolution program.
//!
//! Steps are authored as a flat list with parent links. Siblings are
//! evaluated in list order and a condition's children are only reachable
//! while the condition holds.

use serde::{Deserialize, Serialize};

use crate::id::{FieldId, ProgramId, StateId, StepId};

/// The payload of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Holds when `mask[field] == expected`, inverted by `negate`.
    Condition {
        field: FieldId,
        expected: i32,
        #[serde(default)]
        negate: bool,
    },
    /// Terminal: resolves to `state`.
    Result { state: StateId },
    /// Evaluates another program against the same field mask.
    Reference { program: ProgramId },
}

/// One node of a step tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    /// `None` for root-level steps.
    pub parent: Option<StepId>,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    pub fn condition(id: u32, parent: Option<u32>, field: FieldId, expected: i32) -> Self {
        Step {
            id: StepId(id),
            parent: parent.map(StepId),
            kind: StepKind::Condition {
                field,
                expected,
                negate: false,
            },
        }
    }

    pub fn negated(id: u32, parent: Option<u32>, field: FieldId, expected: i32) -> Self {
        Step {
            id: StepId(id),
            parent: parent.map(StepId),
            kind: StepKind::Condition {
                field,
                expected,
                negate: true,
            },
        }
    }

    pub fn result(id: u32, parent: Option<u32>, state: StateId) -> Self {
        Step {
            id: StepId(id),
            parent: parent.map(StepId),
            kind: StepKind::Result { state },
        }
    }

    pub fn reference(id: u32, parent: Option<u32>, program: ProgramId) -> Self {
        Step {
            id: StepId(id),
            parent: parent.map(StepId),
            kind: StepKind::Reference { program },
        }
    }

    /// A root-level result: always reached if nothing before it matched.
    pub fn is_root_fallback(&self) -> bool {
        self.parent.is_none() && matches!(self.kind, StepKind::Result { .. })
    }
}
