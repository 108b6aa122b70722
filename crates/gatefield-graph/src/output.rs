//! Output fields: the aggregation point of all gates targeting one name.

use gatefield_core::gate::{merge_bool, merge_enum, Gate};
use gatefield_core::id::FieldHandle;
use gatefield_core::value::{ValueKind, EMPTY};

/// Gate list, override layer and diagnostic value of one output field.
#[derive(Debug, Clone)]
pub struct OutputField {
    /// Gates in registration order.
    gates: Vec<Gate>,
    /// Replaces the merged value while present.
    override_value: Option<i32>,
    /// Last merged value, before the override was applied.
    without_override: i32,
}

impl OutputField {
    pub(crate) fn new() -> Self {
        OutputField {
            gates: Vec::new(),
            override_value: None,
            without_override: EMPTY,
        }
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    pub fn override_value(&self) -> Option<i32> {
        self.override_value
    }

    pub fn value_without_override(&self) -> i32 {
        self.without_override
    }

    pub(crate) fn push_gate(&mut self, gate: Gate) {
        self.gates.push(gate);
    }

    /// Removes every gate fed by `source`. Returns how many were removed.
    pub(crate) fn remove_gates_from(&mut self, source: FieldHandle) -> usize {
        let before = self.gates.len();
        self.gates.retain(|g| g.source != source);
        before - self.gates.len()
    }

    /// Drops gates whose source no longer resolves. Returns how many went.
    pub(crate) fn prune_gates(&mut self, is_live: impl Fn(FieldHandle) -> bool) -> usize {
        let before = self.gates.len();
        self.gates.retain(|g| is_live(g.source));
        before - self.gates.len()
    }

    pub(crate) fn set_override(&mut self, value: Option<i32>) {
        self.override_value = value;
    }

    /// Merges the gates, reading source values through `read`.
    ///
    /// Gates whose source does not resolve contribute nothing.
    pub(crate) fn merge(&self, kind: ValueKind, read: impl Fn(FieldHandle) -> Option<i32>) -> i32 {
        match kind {
            ValueKind::Bool => merge_bool(
                self.gates
                    .iter()
                    .filter_map(|g| read(g.source).map(|v| (g.policy, v))),
            ),
            ValueKind::Enum { .. } => {
                merge_enum(kind, self.gates.iter().filter_map(|g| read(g.source)))
            }
        }
    }

    /// Records the merged value and returns the published one.
    pub(crate) fn apply(&mut self, merged: i32) -> i32 {
        self.without_override = merged;
        self.override_value.unwrap_or(merged)
    }
}
