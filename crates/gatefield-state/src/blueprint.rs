//! Authoring blueprints: the serializable description of a session.
//!
//! A blueprint names everything by string. [`Session`](crate::session::Session)
//! interns the names through its registry and wires the described fields,
//! gates and programs into the graph.
//!
//! ```json
//! {
//!   "fields": [
//!     { "name": "Hovered", "kind": "bool" },
//!     { "name": "Pointer", "kind": "bool" }
//!   ],
//!   "states": ["Idle", "Hover"],
//!   "nodes": [{
//!     "name": "button",
//!     "initial": "Idle",
//!     "gates": [{ "target": "Hovered", "source": { "type": "input", "field": "Pointer" } }],
//!     "steps": [
//!       { "id": 1, "kind": "condition", "field": "Hovered", "equals": 1 },
//!       { "id": 2, "parent": 1, "kind": "result", "state": "Hover" },
//!       { "id": 3, "kind": "result", "state": "Idle" }
//!     ]
//!   }]
//! }
//! ```

use std::collections::BTreeMap;

use gatefield_core::gate::MergePolicy;
use gatefield_core::value::ValueKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// States to intern up front, in order. Names used by steps are
    /// interned on first use as well.
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default)]
    pub programs: Vec<ProgramSpec>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

/// A field definition: a name and the kind of values it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: ValueKind,
}

/// A shared, named step program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramSpec {
    pub name: String,
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub id: u32,
    #[serde(default)]
    pub parent: Option<u32>,
    #[serde(flatten)]
    pub kind: StepSpecKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepSpecKind {
    Condition {
        field: String,
        #[serde(default = "default_expected")]
        equals: i32,
        #[serde(default)]
        negate: bool,
    },
    Result {
        state: String,
    },
    Reference {
        program: String,
    },
}

fn default_expected() -> i32 {
    1
}

/// One node: an owner of fields with its own state machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// Starting state. Picked from the program when absent.
    #[serde(default)]
    pub initial: Option<String>,
    /// Shared program to run. Evaluated before `steps`.
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub gates: Vec<GateSpec>,
    /// Seconds to wait before leaving a state.
    #[serde(default)]
    pub exit_delays: BTreeMap<String, f64>,
    /// Seconds to wait before entering a state.
    #[serde(default)]
    pub enter_delays: BTreeMap<String, f64>,
}

/// A gate into output field `target` of the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSpec {
    pub target: String,
    #[serde(default = "default_policy")]
    pub policy: MergePolicy,
    pub source: SourceSpec,
}

fn default_policy() -> MergePolicy {
    MergePolicy::Additive
}

/// Where a gate's value comes from. Nested sources create helper fields
/// owned by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSpec {
    /// The node's input field of this name, created on first use.
    Input {
        field: String,
        #[serde(default)]
        value: i32,
    },
    Constant {
        value: i32,
    },
    /// Output field `field` of another node (or of this one).
    Field {
        field: String,
        #[serde(default)]
        of: OwnerRef,
    },
    Not {
        of: Box<SourceSpec>,
    },
    Equals {
        of: Box<SourceSpec>,
        value: i32,
    },
    AnyOf {
        members: Vec<SourceSpec>,
    },
    AllOf {
        members: Vec<SourceSpec>,
    },
    /// True while output `field` of any direct child is true.
    AnyChild {
        field: String,
    },
    Proxy {
        of: Box<SourceSpec>,
    },
}

/// Which node a [`SourceSpec::Field`] reads from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerRef {
    #[default]
    SelfNode,
    Parent,
    Node(String),
}
