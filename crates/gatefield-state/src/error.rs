//! Error types for sessions and blueprints.

use gatefield_core::CoreError;
use gatefield_graph::GraphError;
use thiserror::Error;

/// Errors produced by the gatefield-state crate.
///
/// Structural problems inside a node (bad steps, unresolvable gates) are
/// repaired and logged rather than returned; these errors cover requests
/// that cannot be carried out at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    /// No node with this name exists.
    #[error("unknown node: '{name}'")]
    UnknownNode { name: String },

    /// A node with this name already exists.
    #[error("duplicate node name: '{name}'")]
    DuplicateNode { name: String },

    /// The node has no input field of this name.
    #[error("node '{node}' has no input field '{field}'")]
    UnknownInput { node: String, field: String },

    /// The node has no output field of this name.
    #[error("node '{node}' has no output field '{field}'")]
    UnknownOutput { node: String, field: String },

    /// A source refers to the parent of a node that has none.
    #[error("node '{node}' has no parent")]
    NoParent { node: String },

    /// The node disabled itself and cannot take state requests.
    #[error("node '{name}' is disabled")]
    NodeDisabled { name: String },
}
