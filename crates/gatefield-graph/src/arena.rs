//! Field storage: a `StableGraph` of field slots plus owner bookkeeping.
//!
//! Node indices are stable across removals, and a per-index generation
//! counter turns them into [`FieldHandle`]s that go stale when the slot is
//! freed. An edge `u -> v` means `v` reads `u`; edges always mirror each
//! slot's upstream snapshot.
//!
//! The arena also owns the owner hierarchy used by `AnyChild` fields and the
//! `(owner, field definition) -> output` index.

use std::collections::HashMap;

use gatefield_core::id::{FieldHandle, FieldId, OwnerId};
use gatefield_core::value::{ValueKind, EMPTY};
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};

use crate::field::{FieldNode, FieldSlot, Upstream};
use crate::sort::DependencySource;

#[derive(Debug, Default)]
pub struct FieldArena {
    graph: StableGraph<FieldSlot, (), Directed, u32>,
    /// Generation of each node index; bumped when the slot is freed.
    generations: Vec<u32>,
    outputs: HashMap<(OwnerId, FieldId), FieldHandle>,
    parents: HashMap<OwnerId, OwnerId>,
    children: HashMap<OwnerId, Vec<OwnerId>>,
}

impl FieldArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new field and returns its handle.
    pub(crate) fn insert(
        &mut self,
        owner: OwnerId,
        def: Option<FieldId>,
        kind: ValueKind,
        node: FieldNode,
    ) -> FieldHandle {
        let is_output = matches!(node, FieldNode::Output(_));
        let slot = FieldSlot {
            handle: FieldHandle::new(0, 0),
            owner,
            def,
            kind,
            node,
            value: EMPTY,
            value_dirty: true,
            upstream: Upstream::new(),
            recomputes: 0,
        };
        let idx = self.graph.add_node(slot);
        let index = idx.index();
        if self.generations.len() <= index {
            self.generations.resize(index + 1, 0);
        }
        let handle = FieldHandle::new(index as u32, self.generations[index]);
        if let Some(slot) = self.graph.node_weight_mut(idx) {
            slot.handle = handle;
        }
        if let (true, Some(def)) = (is_output, def) {
            self.outputs.insert((owner, def), handle);
        }
        handle
    }

    /// Frees a field's slot. Stale handles are ignored.
    pub(crate) fn remove(&mut self, handle: FieldHandle) -> Option<FieldSlot> {
        if !self.is_live(handle) {
            return None;
        }
        let slot = self.graph.remove_node(handle.node_index())?;
        self.generations[handle.index as usize] += 1;
        if let (Some(def), FieldNode::Output(_)) = (slot.def, &slot.node) {
            self.outputs.remove(&(slot.owner, def));
        }
        Some(slot)
    }

    pub fn is_live(&self, handle: FieldHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: FieldHandle) -> Option<&FieldSlot> {
        self.graph
            .node_weight(handle.node_index())
            .filter(|slot| slot.handle == handle)
    }

    pub(crate) fn get_mut(&mut self, handle: FieldHandle) -> Option<&mut FieldSlot> {
        self.graph
            .node_weight_mut(handle.node_index())
            .filter(|slot| slot.handle == handle)
    }

    /// Cached value of a live field.
    pub fn value(&self, handle: FieldHandle) -> Option<i32> {
        self.get(handle).map(|slot| slot.value)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn handles(&self) -> Vec<FieldHandle> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx).map(|slot| slot.handle))
            .collect()
    }

    /// Live fields belonging to `owner`.
    pub fn owned_by(&self, owner: OwnerId) -> Vec<FieldHandle> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .filter(|slot| slot.owner == owner)
            .map(|slot| slot.handle)
            .collect()
    }

    /// Output field `def` of `owner`, if it exists.
    pub fn output(&self, owner: OwnerId, def: FieldId) -> Option<FieldHandle> {
        self.outputs.get(&(owner, def)).copied()
    }

    /// Fields that read `handle`.
    pub fn downstream(&self, handle: FieldHandle) -> Upstream {
        if !self.is_live(handle) {
            return Upstream::new();
        }
        let mut out: Upstream = self
            .graph
            .neighbors_directed(handle.node_index(), Direction::Outgoing)
            .filter_map(|idx| self.graph.node_weight(idx).map(|slot| slot.handle))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// The upstream set `handle` should have right now, derived from its
    /// node and the current hierarchy. Stale references are left out.
    pub(crate) fn desired_upstream(&self, handle: FieldHandle) -> Upstream {
        let Some(slot) = self.get(handle) else {
            return Upstream::new();
        };
        let mut desired = Upstream::new();
        let mut push = |h: FieldHandle| {
            if self.is_live(h) && !desired.contains(&h) {
                desired.push(h);
            }
        };
        match &slot.node {
            FieldNode::Input { .. } | FieldNode::Constant { .. } | FieldNode::Sampled(_) => {}
            FieldNode::Proxy { upstream }
            | FieldNode::Not { upstream }
            | FieldNode::Equals { upstream, .. } => push(*upstream),
            FieldNode::AnyOf { members } | FieldNode::AllOf { members } => {
                members.iter().for_each(|m| push(*m));
            }
            FieldNode::AnyChild { owner, def } => {
                for child in self.children_of(*owner) {
                    if let Some(output) = self.output(*child, *def) {
                        push(output);
                    }
                }
            }
            FieldNode::Output(out) => out.gates().iter().for_each(|g| push(g.source)),
        }
        desired
    }

    /// Replaces the upstream snapshot of `handle` and rewires its edges.
    pub(crate) fn set_upstream(&mut self, handle: FieldHandle, upstream: Upstream) {
        if !self.is_live(handle) {
            return;
        }
        let idx = handle.node_index();
        let incoming: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|edge| edge.id())
            .collect();
        for edge in incoming {
            self.graph.remove_edge(edge);
        }
        for source in &upstream {
            self.graph.add_edge(source.node_index(), idx, ());
        }
        if let Some(slot) = self.graph.node_weight_mut(idx) {
            slot.upstream = upstream;
        }
    }

    /// Read-only view of the dependency graph.
    pub fn dependency_graph(&self) -> &StableGraph<FieldSlot, (), Directed, u32> {
        &self.graph
    }

    // -----------------------------------------------------------------------
    // Owner hierarchy
    // -----------------------------------------------------------------------

    pub fn parent_of(&self, owner: OwnerId) -> Option<OwnerId> {
        self.parents.get(&owner).copied()
    }

    pub fn children_of(&self, owner: OwnerId) -> &[OwnerId] {
        self.children.get(&owner).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True if `ancestor` is `owner` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: OwnerId, owner: OwnerId) -> bool {
        let mut cur = Some(owner);
        while let Some(o) = cur {
            if o == ancestor {
                return true;
            }
            cur = self.parent_of(o);
        }
        false
    }

    pub(crate) fn set_parent(&mut self, child: OwnerId, parent: OwnerId) {
        self.clear_parent(child);
        self.parents.insert(child, parent);
        self.children.entry(parent).or_default().push(child);
    }

    pub(crate) fn clear_parent(&mut self, child: OwnerId) {
        if let Some(old) = self.parents.remove(&child) {
            if let Some(siblings) = self.children.get_mut(&old) {
                siblings.retain(|c| *c != child);
                if siblings.is_empty() {
                    self.children.remove(&old);
                }
            }
        }
    }

    /// Detaches `owner` from the hierarchy in both directions.
    pub(crate) fn detach_owner(&mut self, owner: OwnerId) {
        self.clear_parent(owner);
        if let Some(children) = self.children.remove(&owner) {
            for child in children {
                self.parents.remove(&child);
            }
        }
    }
}

impl DependencySource for FieldArena {
    fn is_live(&self, field: FieldHandle) -> bool {
        FieldArena::is_live(self, field)
    }

    fn upstream_of(&self, field: FieldHandle) -> &[FieldHandle] {
        self.get(field).map(|slot| slot.upstream.as_slice()).unwrap_or(&[])
    }

    fn live_fields(&self) -> Vec<FieldHandle> {
        self.handles()
    }

    fn owner_of(&self, field: FieldHandle) -> Option<OwnerId> {
        self.get(field).map(|slot| slot.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputField;
    use gatefield_core::gate::{Gate, MergePolicy};

    fn input(arena: &mut FieldArena, owner: u32) -> FieldHandle {
        arena.insert(OwnerId(owner), None, ValueKind::Bool, FieldNode::Input { value: 0 })
    }

    #[test]
    fn removed_handles_go_stale() {
        let mut arena = FieldArena::new();
        let a = input(&mut arena, 0);
        assert!(arena.is_live(a));
        assert!(arena.remove(a).is_some());
        assert!(!arena.is_live(a));
        assert!(arena.remove(a).is_none());

        // The slot is reused under a new generation.
        let b = input(&mut arena, 0);
        assert_eq!(b.index, a.index);
        assert_ne!(b.generation, a.generation);
        assert!(!arena.is_live(a));
        assert!(arena.is_live(b));
    }

    #[test]
    fn edges_follow_upstream_snapshot() {
        let mut arena = FieldArena::new();
        let a = input(&mut arena, 0);
        let b = input(&mut arena, 0);
        let not = arena.insert(OwnerId(0), None, ValueKind::Bool, FieldNode::Not { upstream: a });

        let desired = arena.desired_upstream(not);
        assert_eq!(desired.as_slice(), &[a]);
        arena.set_upstream(not, desired);
        assert_eq!(arena.downstream(a).as_slice(), &[not]);
        assert!(arena.downstream(b).is_empty());

        let mut moved = Upstream::new();
        moved.push(b);
        arena.set_upstream(not, moved);
        assert!(arena.downstream(a).is_empty());
        assert_eq!(arena.dependency_graph().edge_count(), 1);
    }

    #[test]
    fn output_index_tracks_removal() {
        let mut arena = FieldArena::new();
        let src = input(&mut arena, 0);
        let mut out = OutputField::new();
        out.push_gate(Gate::new(FieldId(3), MergePolicy::Additive, src));
        let h = arena.insert(OwnerId(1), Some(FieldId(3)), ValueKind::Bool, FieldNode::Output(out));

        assert_eq!(arena.output(OwnerId(1), FieldId(3)), Some(h));
        assert_eq!(arena.desired_upstream(h).as_slice(), &[src]);

        arena.remove(src);
        assert!(arena.desired_upstream(h).is_empty(), "stale sources are skipped");
        arena.remove(h);
        assert_eq!(arena.output(OwnerId(1), FieldId(3)), None);
    }

    #[test]
    fn hierarchy_links_both_ways() {
        let mut arena = FieldArena::new();
        arena.set_parent(OwnerId(2), OwnerId(1));
        arena.set_parent(OwnerId(3), OwnerId(1));
        assert_eq!(arena.children_of(OwnerId(1)), &[OwnerId(2), OwnerId(3)]);
        assert!(arena.is_ancestor(OwnerId(1), OwnerId(3)));

        arena.set_parent(OwnerId(3), OwnerId(2));
        assert_eq!(arena.children_of(OwnerId(1)), &[OwnerId(2)]);
        assert!(arena.is_ancestor(OwnerId(1), OwnerId(3)));

        arena.detach_owner(OwnerId(2));
        assert_eq!(arena.parent_of(OwnerId(3)), None);
        assert!(arena.children_of(OwnerId(1)).is_empty());
    }
}
