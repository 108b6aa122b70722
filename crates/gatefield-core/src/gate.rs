//! Gates: merge-policy-tagged edges from a source field into an output field.
//!
//! Several gates may target the same output. Their registration order is
//! significant: boolean outputs fold through every gate in order, enum
//! outputs take the value of the last gate.

use serde::{Deserialize, Serialize};

use crate::id::{FieldHandle, FieldId};
use crate::value::{as_bool, ValueKind};

/// How a gate's source value combines into its target output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Contributes nothing. Authoring tools emit this for unset gates.
    Unset,
    /// OR-accumulate.
    Additive,
    /// AND-accumulate.
    Subtractive,
    /// OR, then AND.
    Always,
}

impl MergePolicy {
    pub fn is_additive(self) -> bool {
        matches!(self, MergePolicy::Additive | MergePolicy::Always)
    }

    pub fn is_subtractive(self) -> bool {
        matches!(self, MergePolicy::Subtractive | MergePolicy::Always)
    }

    /// Returns true if the policy affects boolean merging at all.
    pub fn is_effective(self) -> bool {
        self.is_additive() || self.is_subtractive()
    }
}

/// A gate bound to an output field.
///
/// Immutable once registered: to change a gate, remove it and add a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gate {
    /// Field definition of the output this gate feeds.
    pub target: FieldId,
    pub policy: MergePolicy,
    /// Field whose value flows through the gate.
    pub source: FieldHandle,
}

impl Gate {
    pub fn new(target: FieldId, policy: MergePolicy, source: FieldHandle) -> Self {
        Gate {
            target,
            policy,
            source,
        }
    }
}

/// Folds `(policy, source value)` pairs into a boolean output value.
///
/// Starts from `false`; additive gates OR their source in, subtractive
/// gates AND it in. Ineffective gates are skipped.
pub fn merge_bool<I>(inputs: I) -> i32
where
    I: IntoIterator<Item = (MergePolicy, i32)>,
{
    let mut result = false;
    for (policy, value) in inputs {
        let source = as_bool(value);
        if policy.is_additive() {
            result |= source;
        }
        if policy.is_subtractive() {
            result &= source;
        }
    }
    i32::from(result)
}

/// Picks the enum output value: the last gate wins, no gates yields the
/// kind's default. Out-of-range values are normalized into the domain.
pub fn merge_enum<I>(kind: ValueKind, inputs: I) -> i32
where
    I: IntoIterator<Item = i32>,
{
    match inputs.into_iter().last() {
        Some(value) => kind.normalize(value),
        None => kind.default_value(),
    }
}
