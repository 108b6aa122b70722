//! Field kinds and the per-slot record stored in the arena.
//!
//! Every field computes one `i32` value from its upstream fields. The kinds
//! differ only in how they pick their upstream set and how they combine it:
//!
//! | kind        | upstream                          | value                        |
//! |-------------|-----------------------------------|------------------------------|
//! | `Input`     | none                              | set from outside             |
//! | `Constant`  | none                              | fixed at creation            |
//! | `Sampled`   | none                              | polled every refresh         |
//! | `Proxy`     | one field                         | the upstream value           |
//! | `Not`       | one field                         | boolean negation             |
//! | `Equals`    | one field                         | `upstream == value`          |
//! | `AnyOf`     | listed members                    | OR of members                |
//! | `AllOf`     | listed members                    | AND of members (true if none)|
//! | `AnyChild`  | the owner's children's outputs    | OR of those outputs          |
//! | `Output`    | gate sources                      | merged gates, then override  |

use std::fmt;

use gatefield_core::id::{FieldHandle, FieldId, OwnerId};
use gatefield_core::value::{as_bool, ValueKind};
use smallvec::SmallVec;

use crate::output::OutputField;

/// Upstream handle list. Most fields have one or two dependencies.
pub type Upstream = SmallVec<[FieldHandle; 4]>;

/// A value source outside the graph, polled on every refresh.
///
/// Fields backed by a sampler cannot announce their own changes, so they are
/// recomputed unconditionally and everything downstream hears about the
/// result through the normal change notification.
pub trait FieldSampler {
    fn sample(&self) -> i32;
}

impl<F> FieldSampler for F
where
    F: Fn() -> i32,
{
    fn sample(&self) -> i32 {
        self()
    }
}

/// How a field produces its value.
pub enum FieldNode {
    Input { value: i32 },
    Constant { value: i32 },
    Sampled(Box<dyn FieldSampler>),
    Proxy { upstream: FieldHandle },
    Not { upstream: FieldHandle },
    Equals { upstream: FieldHandle, value: i32 },
    AnyOf { members: Upstream },
    AllOf { members: Upstream },
    /// OR over output `def` of every direct child of `owner`.
    AnyChild { owner: OwnerId, def: FieldId },
    Output(OutputField),
}

impl FieldNode {
    /// Short lowercase name, used in logs and stats.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldNode::Input { .. } => "input",
            FieldNode::Constant { .. } => "constant",
            FieldNode::Sampled(_) => "sampled",
            FieldNode::Proxy { .. } => "proxy",
            FieldNode::Not { .. } => "not",
            FieldNode::Equals { .. } => "equals",
            FieldNode::AnyOf { .. } => "any_of",
            FieldNode::AllOf { .. } => "all_of",
            FieldNode::AnyChild { .. } => "any_child",
            FieldNode::Output(_) => "output",
        }
    }

    /// Proxies have no value of their own; they forward their upstream.
    pub fn is_proxy(&self) -> bool {
        matches!(self, FieldNode::Proxy { .. })
    }

    /// True for fields whose value can change without any graph event.
    pub fn is_volatile(&self) -> bool {
        matches!(self, FieldNode::Sampled(_))
    }

    pub fn as_output(&self) -> Option<&OutputField> {
        match self {
            FieldNode::Output(out) => Some(out),
            _ => None,
        }
    }

    pub fn as_output_mut(&mut self) -> Option<&mut OutputField> {
        match self {
            FieldNode::Output(out) => Some(out),
            _ => None,
        }
    }

    /// Computes the raw value of this field.
    ///
    /// `upstream` is the dependency snapshot the sorter ordered this field
    /// by; `read` returns the cached value of a live field. For outputs the
    /// result is the merged gate value, before any override.
    pub(crate) fn compute(
        &self,
        kind: ValueKind,
        upstream: &[FieldHandle],
        read: impl Fn(FieldHandle) -> Option<i32>,
    ) -> i32 {
        let raw = match self {
            FieldNode::Input { value } | FieldNode::Constant { value } => *value,
            FieldNode::Sampled(sampler) => sampler.sample(),
            FieldNode::Proxy { upstream } => read(*upstream).unwrap_or_else(|| kind.default_value()),
            FieldNode::Not { upstream } => {
                i32::from(!read(*upstream).map(as_bool).unwrap_or(false))
            }
            FieldNode::Equals { upstream, value } => i32::from(read(*upstream) == Some(*value)),
            FieldNode::AnyOf { members } => i32::from(
                members
                    .iter()
                    .filter_map(|m| read(*m))
                    .any(as_bool),
            ),
            FieldNode::AllOf { members } => i32::from(
                members
                    .iter()
                    .filter_map(|m| read(*m))
                    .all(as_bool),
            ),
            FieldNode::AnyChild { .. } => {
                i32::from(upstream.iter().filter_map(|u| read(*u)).any(as_bool))
            }
            FieldNode::Output(out) => out.merge(kind, read),
        };
        kind.normalize(raw)
    }
}

impl fmt::Debug for FieldNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldNode::Input { value } => f.debug_struct("Input").field("value", value).finish(),
            FieldNode::Constant { value } => {
                f.debug_struct("Constant").field("value", value).finish()
            }
            FieldNode::Sampled(_) => f.write_str("Sampled(..)"),
            FieldNode::Proxy { upstream } => {
                f.debug_struct("Proxy").field("upstream", upstream).finish()
            }
            FieldNode::Not { upstream } => f.debug_struct("Not").field("upstream", upstream).finish(),
            FieldNode::Equals { upstream, value } => f
                .debug_struct("Equals")
                .field("upstream", upstream)
                .field("value", value)
                .finish(),
            FieldNode::AnyOf { members } => f.debug_struct("AnyOf").field("members", members).finish(),
            FieldNode::AllOf { members } => f.debug_struct("AllOf").field("members", members).finish(),
            FieldNode::AnyChild { owner, def } => f
                .debug_struct("AnyChild")
                .field("owner", owner)
                .field("def", def)
                .finish(),
            FieldNode::Output(out) => f.debug_tuple("Output").field(out).finish(),
        }
    }
}

/// One arena slot: a field plus its cached evaluation state.
#[derive(Debug)]
pub struct FieldSlot {
    pub(crate) handle: FieldHandle,
    pub(crate) owner: OwnerId,
    /// Field definition this slot publishes under, if any.
    pub(crate) def: Option<FieldId>,
    pub(crate) kind: ValueKind,
    pub(crate) node: FieldNode,
    /// Cached value; `EMPTY` until first computed.
    pub(crate) value: i32,
    /// Set when an upstream changed or the field itself was touched.
    pub(crate) value_dirty: bool,
    /// Upstream snapshot as of the last edge refresh.
    pub(crate) upstream: Upstream,
    pub(crate) recomputes: u64,
}

impl FieldSlot {
    pub fn handle(&self) -> FieldHandle {
        self.handle
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn def(&self) -> Option<FieldId> {
        self.def
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn node(&self) -> &FieldNode {
        &self.node
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn upstream(&self) -> &[FieldHandle] {
        &self.upstream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn h(i: u32) -> FieldHandle {
        FieldHandle::new(i, 0)
    }

    fn read_table(values: &[(u32, i32)]) -> impl Fn(FieldHandle) -> Option<i32> + '_ {
        move |handle| {
            values
                .iter()
                .find(|(i, _)| h(*i) == handle)
                .map(|(_, v)| *v)
        }
    }

    #[test]
    fn sampler_closure_is_polled() {
        let node = FieldNode::Sampled(Box::new(|| 1));
        assert!(node.is_volatile());
        assert_eq!(node.compute(ValueKind::Bool, &[], |_| None), 1);
    }

    #[test]
    fn derived_boolean_kinds() {
        let table = [(1, 1), (2, 0), (3, 4)];
        let read = read_table(&table);

        let not = FieldNode::Not { upstream: h(2) };
        assert_eq!(not.compute(ValueKind::Bool, &[], &read), 1);

        let eq = FieldNode::Equals { upstream: h(3), value: 4 };
        assert_eq!(eq.compute(ValueKind::Bool, &[], &read), 1);

        let any = FieldNode::AnyOf { members: smallvec![h(1), h(2)] };
        assert_eq!(any.compute(ValueKind::Bool, &[], &read), 1);

        let all = FieldNode::AllOf { members: smallvec![h(1), h(2)] };
        assert_eq!(all.compute(ValueKind::Bool, &[], &read), 0);

        let empty = FieldNode::AllOf { members: smallvec![] };
        assert_eq!(empty.compute(ValueKind::Bool, &[], &read), 1);
    }

    #[test]
    fn proxy_forwards_and_falls_back_to_default() {
        let kind = ValueKind::Enum { cardinality: 5 };
        let table = [(1, 3)];
        let read = read_table(&table);

        let live = FieldNode::Proxy { upstream: h(1) };
        assert!(live.is_proxy());
        assert_eq!(live.compute(kind, &[], &read), 3);

        let gone = FieldNode::Proxy { upstream: h(9) };
        assert_eq!(gone.compute(kind, &[], &read), 0);
    }

    #[test]
    fn any_child_reads_its_snapshot() {
        let node = FieldNode::AnyChild { owner: OwnerId(0), def: FieldId(0) };
        let table = [(1, 0), (2, 1)];
        let read = read_table(&table);
        assert_eq!(node.compute(ValueKind::Bool, &[h(1), h(2)], &read), 1);
        assert_eq!(node.compute(ValueKind::Bool, &[h(1)], &read), 0);
    }

    #[test]
    fn input_values_are_normalized() {
        let node = FieldNode::Input { value: 9 };
        assert_eq!(node.compute(ValueKind::Enum { cardinality: 3 }, &[], |_| None), 0);
        assert_eq!(node.compute(ValueKind::Bool, &[], |_| None), 1);
    }
}
