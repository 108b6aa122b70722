//! Core error types for gatefield-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! registration and name-resolution failures.

use thiserror::Error;

use crate::id::FieldId;
use crate::value::ValueKind;

/// Core errors produced by the gatefield-core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A field name was registered twice with different value kinds.
    #[error("field '{name}' already registered as {existing:?}, requested {requested:?}")]
    FieldKindConflict {
        name: String,
        existing: ValueKind,
        requested: ValueKind,
    },

    /// An enum field was declared with no variants.
    #[error("enum field '{name}' must have a non-zero cardinality")]
    EmptyEnum { name: String },

    /// A field name has not been registered.
    #[error("unknown field: '{name}'")]
    UnknownField { name: String },

    /// A field id is not present in the registry.
    #[error("field not found: FieldId({id})", id = id.0)]
    FieldNotFound { id: FieldId },

    /// A state name has not been interned.
    #[error("unknown state: '{name}'")]
    UnknownState { name: String },

    /// A program name has not been interned.
    #[error("unknown program: '{name}'")]
    UnknownProgram { name: String },
}
