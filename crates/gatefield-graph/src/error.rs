//! Error types for field graph operations.

use gatefield_core::id::{FieldHandle, OwnerId};
use gatefield_core::value::ValueKind;
use thiserror::Error;

/// Errors produced by the gatefield-graph crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The handle is stale or was never issued.
    #[error("field not found: {field}")]
    FieldNotFound { field: FieldHandle },

    /// An output-only operation was applied to another field kind.
    #[error("field {field} is not an output field")]
    NotAnOutput { field: FieldHandle },

    /// `set_input` was applied to a field that is not an input.
    #[error("field {field} is not an input field")]
    NotAnInput { field: FieldHandle },

    /// A value outside the field's domain.
    #[error("value {value} is out of range for {kind:?} field {field}")]
    ValueOutOfRange {
        field: FieldHandle,
        value: i32,
        kind: ValueKind,
    },

    /// An existing output was requested with a different value kind.
    #[error("output field {field} holds {actual:?} values, not {expected:?}")]
    KindMismatch {
        field: FieldHandle,
        expected: ValueKind,
        actual: ValueKind,
    },

    /// Parenting would make an owner its own ancestor.
    #[error("owner {child} cannot be parented under its own descendant {parent}")]
    HierarchyCycle { child: OwnerId, parent: OwnerId },

    /// A dependency cycle exists and the graph runs with strict cycles.
    #[error("dependency cycle through field {field} (read by {dependent}), {count} cycle point(s)")]
    CycleDetected {
        field: FieldHandle,
        dependent: FieldHandle,
        owner: Option<OwnerId>,
        count: usize,
    },
}
