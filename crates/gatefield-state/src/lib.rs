//! Node state machines driven by the field graph.
//!
//! A [`Session`] owns a registry, a [`FieldGraph`](gatefield_graph::FieldGraph),
//! a library of shared step programs and a set of named nodes. Each tick
//! refreshes the graph, then lets every node whose fields changed evaluate
//! its step program and move toward the resulting state.

pub mod blueprint;
pub mod config;
pub mod error;
pub mod eval;
pub mod machine;
pub mod program;
pub mod session;

pub use blueprint::{Blueprint, FieldSpec, GateSpec, NodeSpec, OwnerRef, ProgramSpec, SourceSpec, StepSpec, StepSpecKind};
pub use config::SessionConfig;
pub use error::SessionError;
pub use eval::{Evaluator, FieldMask};
pub use machine::{StateChange, StateMachine, Transition};
pub use program::{ProgramLibrary, Repair, StepProgram};
pub use session::{NodeEntry, Session, TickReport};
