//! `FieldGraph`: the public entry point for building and refreshing fields.
//!
//! A refresh runs three stages:
//!
//! 1. **Edge refresh.** Every field's upstream set is re-derived (gates,
//!    members, the owner hierarchy) and compared with its snapshot. Changed
//!    fields get new edges, their islands are merged and marked dirty, and
//!    their values are flagged for recomputation. Gates whose source was
//!    removed are dropped here.
//! 2. **Sort slice.** The [`TopoSorter`] advances by at most
//!    [`GraphConfig::op_budget`] operations. If it yields, the refresh ends
//!    and values stay as they were.
//! 3. **Value refresh.** Once the order is stable, fields are visited in
//!    order. A field whose value is clean is skipped; otherwise it is
//!    recomputed and, if its value changed, every downstream field is
//!    flagged and a [`ValueChange`] is queued.
//!
//! Sampled fields have no way to announce changes and are recomputed on
//! every value refresh. Everything else, proxies included, is recomputed
//! only when flagged, so an island made of inputs and outputs costs nothing
//! while its inputs hold still.

use std::collections::HashSet;

use gatefield_core::gate::{Gate, MergePolicy};
use gatefield_core::id::{FieldHandle, FieldId, OwnerId};
use gatefield_core::value::{ValueKind, EMPTY};
use petgraph::stable_graph::StableGraph;
use petgraph::Directed;

use crate::arena::FieldArena;
use crate::config::GraphConfig;
use crate::error::GraphError;
use crate::events::{FieldStats, RefreshReport, ValueChange};
use crate::field::{FieldNode, FieldSampler, FieldSlot, Upstream};
use crate::output::OutputField;
use crate::sort::{CyclePoint, SortProgress, SortStats, TopoSorter};

/// Result of recomputing one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recompute {
    Missing,
    Skipped,
    Unchanged,
    Changed,
}

#[derive(Debug, Default)]
pub struct FieldGraph {
    arena: FieldArena,
    sorter: TopoSorter,
    config: GraphConfig,
    /// Pending change notifications, drained by [`take_changes`](Self::take_changes).
    changes: Vec<ValueChange>,
}

impl FieldGraph {
    pub fn new(config: GraphConfig) -> Self {
        FieldGraph {
            arena: FieldArena::new(),
            sorter: TopoSorter::new(),
            config,
            changes: Vec::new(),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: GraphConfig) {
        self.config = config;
    }

    // -----------------------------------------------------------------------
    // Field construction
    // -----------------------------------------------------------------------

    fn add_field(
        &mut self,
        owner: OwnerId,
        def: Option<FieldId>,
        kind: ValueKind,
        node: FieldNode,
    ) -> FieldHandle {
        let handle = self.arena.insert(owner, def, kind, node);
        self.sorter.mark_dirty(handle);
        handle
    }

    fn require_live(&self, field: FieldHandle) -> Result<&FieldSlot, GraphError> {
        self.arena
            .get(field)
            .ok_or(GraphError::FieldNotFound { field })
    }

    /// Adds an externally set field. Out-of-range initial values are
    /// normalized into the kind's domain.
    pub fn add_input(
        &mut self,
        owner: OwnerId,
        def: Option<FieldId>,
        kind: ValueKind,
        value: i32,
    ) -> FieldHandle {
        let value = kind.normalize(value);
        self.add_field(owner, def, kind, FieldNode::Input { value })
    }

    pub fn add_constant(&mut self, owner: OwnerId, kind: ValueKind, value: i32) -> FieldHandle {
        let value = kind.normalize(value);
        self.add_field(owner, None, kind, FieldNode::Constant { value })
    }

    /// Adds a field polled from `sampler` on every value refresh.
    pub fn add_sampled<S>(&mut self, owner: OwnerId, kind: ValueKind, sampler: S) -> FieldHandle
    where
        S: FieldSampler + 'static,
    {
        self.add_field(owner, None, kind, FieldNode::Sampled(Box::new(sampler)))
    }

    /// Adds a field forwarding `upstream`, with the same value kind.
    pub fn add_proxy(&mut self, owner: OwnerId, upstream: FieldHandle) -> Result<FieldHandle, GraphError> {
        let kind = self.require_live(upstream)?.kind;
        Ok(self.add_field(owner, None, kind, FieldNode::Proxy { upstream }))
    }

    pub fn add_not(&mut self, owner: OwnerId, upstream: FieldHandle) -> Result<FieldHandle, GraphError> {
        self.require_live(upstream)?;
        Ok(self.add_field(owner, None, ValueKind::Bool, FieldNode::Not { upstream }))
    }

    /// Adds a boolean field that is true while `upstream == value`.
    pub fn add_equals(
        &mut self,
        owner: OwnerId,
        upstream: FieldHandle,
        value: i32,
    ) -> Result<FieldHandle, GraphError> {
        self.require_live(upstream)?;
        Ok(self.add_field(owner, None, ValueKind::Bool, FieldNode::Equals { upstream, value }))
    }

    pub fn add_any_of(&mut self, owner: OwnerId, members: &[FieldHandle]) -> Result<FieldHandle, GraphError> {
        let members = self.live_members(members)?;
        Ok(self.add_field(owner, None, ValueKind::Bool, FieldNode::AnyOf { members }))
    }

    /// Adds a boolean AND over `members`. An empty member list is true.
    pub fn add_all_of(&mut self, owner: OwnerId, members: &[FieldHandle]) -> Result<FieldHandle, GraphError> {
        let members = self.live_members(members)?;
        Ok(self.add_field(owner, None, ValueKind::Bool, FieldNode::AllOf { members }))
    }

    fn live_members(&self, members: &[FieldHandle]) -> Result<Upstream, GraphError> {
        for member in members {
            self.require_live(*member)?;
        }
        Ok(members.iter().copied().collect())
    }

    /// Adds a boolean field that is true while output `def` of any direct
    /// child of `owner` is true. Follows later hierarchy changes.
    pub fn add_any_child(&mut self, owner: OwnerId, def: FieldId) -> FieldHandle {
        self.add_field(owner, None, ValueKind::Bool, FieldNode::AnyChild { owner, def })
    }

    /// Returns output `def` of `owner`, creating it on first request.
    pub fn output_field(
        &mut self,
        owner: OwnerId,
        def: FieldId,
        kind: ValueKind,
    ) -> Result<FieldHandle, GraphError> {
        if let Some(field) = self.arena.output(owner, def) {
            let actual = self.require_live(field)?.kind;
            if actual != kind {
                return Err(GraphError::KindMismatch {
                    field,
                    expected: kind,
                    actual,
                });
            }
            return Ok(field);
        }
        let node = FieldNode::Output(OutputField::new());
        Ok(self.add_field(owner, Some(def), kind, node))
    }

    /// Output `def` of `owner`, if it has been created.
    pub fn find_output(&self, owner: OwnerId, def: FieldId) -> Option<FieldHandle> {
        self.arena.output(owner, def)
    }

    /// Registers a gate from `source` into output `def` of `owner`,
    /// creating the output if needed. Returns the output's handle.
    pub fn add_gate(
        &mut self,
        owner: OwnerId,
        def: FieldId,
        kind: ValueKind,
        policy: MergePolicy,
        source: FieldHandle,
    ) -> Result<FieldHandle, GraphError> {
        self.require_live(source)?;
        let output = self.output_field(owner, def, kind)?;
        if kind.is_bool() && !policy.is_effective() {
            tracing::warn!(
                "gate from field {} into output {} of owner {} has no merge policy and contributes nothing",
                source,
                def,
                owner
            );
        }
        let slot = self
            .arena
            .get_mut(output)
            .ok_or(GraphError::FieldNotFound { field: output })?;
        if let Some(out) = slot.node.as_output_mut() {
            out.push_gate(Gate::new(def, policy, source));
        }
        slot.value_dirty = true;
        Ok(output)
    }

    /// Removes every gate from `source` into `output`. Returns the count.
    pub fn remove_gates(&mut self, output: FieldHandle, source: FieldHandle) -> Result<usize, GraphError> {
        let slot = self
            .arena
            .get_mut(output)
            .ok_or(GraphError::FieldNotFound { field: output })?;
        let out = slot
            .node
            .as_output_mut()
            .ok_or(GraphError::NotAnOutput { field: output })?;
        let removed = out.remove_gates_from(source);
        if removed > 0 {
            slot.value_dirty = true;
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Value mutation
    // -----------------------------------------------------------------------

    /// Sets an input field. Takes effect on the next refresh.
    pub fn set_input(&mut self, field: FieldHandle, value: i32) -> Result<(), GraphError> {
        let slot = self
            .arena
            .get_mut(field)
            .ok_or(GraphError::FieldNotFound { field })?;
        let kind = slot.kind;
        let FieldNode::Input { value: current } = &mut slot.node else {
            return Err(GraphError::NotAnInput { field });
        };
        if !kind.contains(value) {
            return Err(GraphError::ValueOutOfRange { field, value, kind });
        }
        if *current != value {
            *current = value;
            slot.value_dirty = true;
        }
        Ok(())
    }

    /// Pins an output to `value` and recomputes it immediately.
    pub fn set_override(&mut self, field: FieldHandle, value: i32) -> Result<(), GraphError> {
        self.write_override(field, Some(value))
    }

    /// Releases an override and recomputes the output immediately.
    pub fn clear_override(&mut self, field: FieldHandle) -> Result<(), GraphError> {
        self.write_override(field, None)
    }

    fn write_override(&mut self, field: FieldHandle, value: Option<i32>) -> Result<(), GraphError> {
        let slot = self
            .arena
            .get_mut(field)
            .ok_or(GraphError::FieldNotFound { field })?;
        let kind = slot.kind;
        let out = slot
            .node
            .as_output_mut()
            .ok_or(GraphError::NotAnOutput { field })?;
        if let Some(value) = value {
            if !kind.contains(value) {
                return Err(GraphError::ValueOutOfRange { field, value, kind });
            }
        }
        out.set_override(value);
        slot.value_dirty = true;
        self.recompute(field, true);
        Ok(())
    }

    /// Flags a field for recomputation and its island for re-sorting.
    pub fn mark_dirty(&mut self, field: FieldHandle) -> Result<(), GraphError> {
        let slot = self
            .arena
            .get_mut(field)
            .ok_or(GraphError::FieldNotFound { field })?;
        slot.value_dirty = true;
        self.sorter.mark_dirty(field);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Removal and hierarchy
    // -----------------------------------------------------------------------

    /// Removes a field. Its handle goes stale; readers see the change on
    /// the next refresh.
    pub fn remove_field(&mut self, field: FieldHandle) -> Result<(), GraphError> {
        let downstream = self.arena.downstream(field);
        self.arena
            .remove(field)
            .ok_or(GraphError::FieldNotFound { field })?;
        self.sorter.forget(field);
        for reader in downstream {
            if let Some(slot) = self.arena.get_mut(reader) {
                slot.value_dirty = true;
            }
        }
        Ok(())
    }

    /// Removes every field of `owner` and detaches it from the hierarchy.
    /// Returns the number of fields removed.
    pub fn remove_owner(&mut self, owner: OwnerId) -> usize {
        let fields = self.arena.owned_by(owner);
        let count = fields
            .into_iter()
            .filter(|field| self.remove_field(*field).is_ok())
            .count();
        self.arena.detach_owner(owner);
        count
    }

    /// Makes `child` a direct child of `parent`, replacing any previous
    /// parent.
    pub fn set_parent(&mut self, child: OwnerId, parent: OwnerId) -> Result<(), GraphError> {
        if self.arena.is_ancestor(child, parent) {
            return Err(GraphError::HierarchyCycle { child, parent });
        }
        self.arena.set_parent(child, parent);
        Ok(())
    }

    pub fn clear_parent(&mut self, child: OwnerId) {
        self.arena.clear_parent(child);
    }

    pub fn parent_of(&self, owner: OwnerId) -> Option<OwnerId> {
        self.arena.parent_of(owner)
    }

    pub fn children_of(&self, owner: OwnerId) -> &[OwnerId] {
        self.arena.children_of(owner)
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    /// Runs one refresh: edge refresh, a budgeted sort slice, and a value
    /// refresh if the order is stable.
    ///
    /// With `strict_cycles` set, a graph whose last sort found a cycle
    /// returns [`GraphError::CycleDetected`] instead of refreshing values.
    pub fn refresh(&mut self) -> Result<RefreshReport, GraphError> {
        let mut report = RefreshReport {
            topology_changed: self.refresh_edges(),
            ..RefreshReport::default()
        };

        match self.sorter.step(&self.arena, self.config.op_budget) {
            SortProgress::Idle => {}
            SortProgress::Yielded { ops } => {
                report.sort_ops = ops;
                tracing::debug!("sort yielded after {} ops, values not refreshed", ops);
                return Ok(report);
            }
            SortProgress::Completed { ops, .. } => {
                report.sort_ops = ops;
                report.cycles = self.sorter.last_cycles().to_vec();
                for cycle in &report.cycles {
                    tracing::error!(
                        "dependency cycle: field {} (owner {:?}) reads field {} which is still being sorted",
                        cycle.dependent,
                        cycle.owner,
                        cycle.field
                    );
                }
            }
        }

        if self.config.strict_cycles {
            if let Some(first) = self.sorter.last_cycles().first() {
                return Err(GraphError::CycleDetected {
                    field: first.field,
                    dependent: first.dependent,
                    owner: first.owner,
                    count: self.sorter.last_cycles().len(),
                });
            }
        }

        report.stable = true;
        self.refresh_values(&mut report);
        Ok(report)
    }

    /// Re-derives every field's upstream set. Returns true if any changed.
    fn refresh_edges(&mut self) -> bool {
        let mut changed = false;
        for field in self.arena.handles() {
            self.prune_dead_gates(field);

            let desired = self.arena.desired_upstream(field);
            let Some(slot) = self.arena.get(field) else {
                continue;
            };
            if slot.upstream == desired {
                continue;
            }
            let added: Upstream = desired
                .iter()
                .filter(|u| !slot.upstream.contains(u))
                .copied()
                .collect();
            for upstream in added {
                self.sorter.connect(upstream, field);
            }
            self.sorter.mark_dirty(field);
            self.arena.set_upstream(field, desired);
            if let Some(slot) = self.arena.get_mut(field) {
                slot.value_dirty = true;
            }
            changed = true;
        }
        if changed {
            tracing::debug!("dependency edges changed, {} dirty island(s)", self.sorter.dirty_islands());
        }
        changed
    }

    fn prune_dead_gates(&mut self, field: FieldHandle) {
        let dead: HashSet<FieldHandle> = match self.arena.get(field).and_then(|s| s.node.as_output()) {
            Some(out) => out
                .gates()
                .iter()
                .map(|g| g.source)
                .filter(|source| !self.arena.is_live(*source))
                .collect(),
            None => return,
        };
        if dead.is_empty() {
            return;
        }
        if let Some(slot) = self.arena.get_mut(field) {
            if let Some(out) = slot.node.as_output_mut() {
                let pruned = out.prune_gates(|source| !dead.contains(&source));
                tracing::debug!("dropped {} gate(s) with removed sources from output {}", pruned, field);
            }
            slot.value_dirty = true;
        }
    }

    fn refresh_values(&mut self, report: &mut RefreshReport) {
        let order: Vec<FieldHandle> = self.sorter.order().iter().copied().collect();
        for field in order {
            match self.recompute(field, false) {
                Recompute::Missing => {}
                Recompute::Skipped => report.skipped += 1,
                Recompute::Unchanged => report.recomputed += 1,
                Recompute::Changed => {
                    report.recomputed += 1;
                    report.changed += 1;
                }
            }
        }
    }

    fn recompute(&mut self, field: FieldHandle, force: bool) -> Recompute {
        let raw = {
            let Some(slot) = self.arena.get(field) else {
                return Recompute::Missing;
            };
            let clean = !slot.value_dirty && slot.value != EMPTY && !slot.node.is_volatile();
            if clean && !force {
                return Recompute::Skipped;
            }
            let arena = &self.arena;
            slot.node.compute(slot.kind, &slot.upstream, |h| arena.value(h))
        };

        let Some(slot) = self.arena.get_mut(field) else {
            return Recompute::Missing;
        };
        let value = match slot.node.as_output_mut() {
            Some(out) => out.apply(raw),
            None => raw,
        };
        slot.value_dirty = false;
        slot.recomputes += 1;
        let old = slot.value;
        if old == value {
            return Recompute::Unchanged;
        }
        slot.value = value;
        self.changes.push(ValueChange {
            field,
            owner: slot.owner,
            def: slot.def,
            old,
            new: value,
        });
        for reader in self.arena.downstream(field) {
            if let Some(slot) = self.arena.get_mut(reader) {
                slot.value_dirty = true;
            }
        }
        Recompute::Changed
    }

    /// Drains queued value changes, oldest first.
    pub fn take_changes(&mut self) -> Vec<ValueChange> {
        std::mem::take(&mut self.changes)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Cached value of a live field. `EMPTY` until first computed.
    pub fn value(&self, field: FieldHandle) -> Option<i32> {
        self.arena.value(field)
    }

    pub fn output_value(&self, owner: OwnerId, def: FieldId) -> Option<i32> {
        self.arena.output(owner, def).and_then(|h| self.arena.value(h))
    }

    /// The merged value an output would have without its override.
    pub fn value_without_override(&self, field: FieldHandle) -> Result<i32, GraphError> {
        self.output_ref(field).map(OutputField::value_without_override)
    }

    pub fn override_value(&self, field: FieldHandle) -> Result<Option<i32>, GraphError> {
        self.output_ref(field).map(OutputField::override_value)
    }

    pub fn gates(&self, field: FieldHandle) -> Result<&[Gate], GraphError> {
        self.output_ref(field).map(OutputField::gates)
    }

    fn output_ref(&self, field: FieldHandle) -> Result<&OutputField, GraphError> {
        self.require_live(field)?
            .node
            .as_output()
            .ok_or(GraphError::NotAnOutput { field })
    }

    pub fn kind(&self, field: FieldHandle) -> Option<ValueKind> {
        self.arena.get(field).map(|slot| slot.kind)
    }

    pub fn is_live(&self, field: FieldHandle) -> bool {
        self.arena.is_live(field)
    }

    pub fn slot(&self, field: FieldHandle) -> Option<&FieldSlot> {
        self.arena.get(field)
    }

    pub fn fields_of(&self, owner: OwnerId) -> Vec<FieldHandle> {
        self.arena.owned_by(owner)
    }

    pub fn field_count(&self) -> usize {
        self.arena.len()
    }

    /// Current global order. Topologically valid once [`is_stable`](Self::is_stable).
    pub fn order(&self) -> impl Iterator<Item = FieldHandle> + '_ {
        self.sorter.order().iter().copied()
    }

    pub fn is_stable(&self) -> bool {
        self.sorter.is_stable()
    }

    pub fn sort_stats(&self) -> SortStats {
        self.sorter.stats()
    }

    pub fn last_cycles(&self) -> &[CyclePoint] {
        self.sorter.last_cycles()
    }

    pub fn island_count(&mut self) -> usize {
        self.sorter.island_count()
    }

    pub fn same_island(&mut self, a: FieldHandle, b: FieldHandle) -> bool {
        self.sorter.same_island(a, b)
    }

    pub fn field_stats(&self, field: FieldHandle) -> Option<FieldStats> {
        let slot = self.arena.get(field)?;
        Some(FieldStats {
            field,
            owner: slot.owner,
            kind: slot.node.kind_name(),
            value: slot.value,
            upstream: slot.upstream.len(),
            downstream: self.arena.downstream(field).len(),
            recomputes: slot.recomputes,
            is_proxy: slot.node.is_proxy(),
        })
    }

    /// Read-only view of the dependency graph (`u -> v` when `v` reads `u`).
    pub fn dependency_graph(&self) -> &StableGraph<FieldSlot, (), Directed, u32> {
        self.arena.dependency_graph()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: OwnerId = OwnerId(0);
    const HOVERED: FieldId = FieldId(0);
    const MODE: FieldId = FieldId(1);

    fn settle(graph: &mut FieldGraph) -> RefreshReport {
        let mut report = graph.refresh().unwrap();
        while !report.stable {
            report = graph.refresh().unwrap();
        }
        report
    }

    #[test]
    fn gate_merge_respects_policies() {
        let mut graph = FieldGraph::default();
        let on = graph.add_input(OWNER, None, ValueKind::Bool, 1);
        let off = graph.add_input(OWNER, None, ValueKind::Bool, 0);
        let out = graph
            .add_gate(OWNER, HOVERED, ValueKind::Bool, MergePolicy::Additive, on)
            .unwrap();
        graph
            .add_gate(OWNER, HOVERED, ValueKind::Bool, MergePolicy::Subtractive, off)
            .unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(out), Some(0));

        graph.set_input(off, 1).unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(out), Some(1));
    }

    #[test]
    fn override_masks_merged_value() {
        let mut graph = FieldGraph::default();
        let kind = ValueKind::Enum { cardinality: 8 };
        let src = graph.add_input(OWNER, None, kind, 3);
        let out = graph
            .add_gate(OWNER, MODE, kind, MergePolicy::Additive, src)
            .unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(out), Some(3));

        graph.set_override(out, 7).unwrap();
        assert_eq!(graph.value(out), Some(7), "override applies without a refresh");
        assert_eq!(graph.value_without_override(out), Ok(3));

        graph.clear_override(out).unwrap();
        assert_eq!(graph.value(out), Some(3));
    }

    #[test]
    fn override_validates_domain_and_kind() {
        let mut graph = FieldGraph::default();
        let src = graph.add_input(OWNER, None, ValueKind::Bool, 0);
        let out = graph
            .add_gate(OWNER, HOVERED, ValueKind::Bool, MergePolicy::Additive, src)
            .unwrap();
        assert!(matches!(
            graph.set_override(out, 2),
            Err(GraphError::ValueOutOfRange { value: 2, .. })
        ));
        assert_eq!(graph.set_override(src, 1), Err(GraphError::NotAnOutput { field: src }));
        assert!(matches!(
            graph.output_field(OWNER, HOVERED, ValueKind::Enum { cardinality: 2 }),
            Err(GraphError::KindMismatch { .. })
        ));
    }

    #[test]
    fn first_refresh_publishes_initial_values() {
        let mut graph = FieldGraph::default();
        let src = graph.add_input(OWNER, Some(HOVERED), ValueKind::Bool, 1);
        settle(&mut graph);
        let changes = graph.take_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, src);
        assert_eq!(changes[0].def, Some(HOVERED));
        assert_eq!((changes[0].old, changes[0].new), (EMPTY, 1));
        assert!(graph.take_changes().is_empty());
    }

    #[test]
    fn removed_source_drops_its_gates() {
        let mut graph = FieldGraph::default();
        let a = graph.add_input(OWNER, None, ValueKind::Bool, 1);
        let b = graph.add_input(OWNER, None, ValueKind::Bool, 0);
        let out = graph
            .add_gate(OWNER, HOVERED, ValueKind::Bool, MergePolicy::Additive, a)
            .unwrap();
        graph
            .add_gate(OWNER, HOVERED, ValueKind::Bool, MergePolicy::Additive, b)
            .unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(out), Some(1));

        graph.remove_field(a).unwrap();
        let report = settle(&mut graph);
        assert!(report.topology_changed);
        assert_eq!(graph.gates(out).unwrap().len(), 1);
        assert_eq!(graph.value(out), Some(0));
        assert_eq!(graph.value(a), None);
    }

    #[test]
    fn any_child_follows_hierarchy() {
        let mut graph = FieldGraph::default();
        let parent = OwnerId(1);
        let child = OwnerId(2);
        let any = graph.add_any_child(parent, HOVERED);
        let src = graph.add_input(child, None, ValueKind::Bool, 1);
        graph
            .add_gate(child, HOVERED, ValueKind::Bool, MergePolicy::Additive, src)
            .unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(any), Some(0));

        graph.set_parent(child, parent).unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(any), Some(1));

        graph.clear_parent(child);
        settle(&mut graph);
        assert_eq!(graph.value(any), Some(0));
    }

    #[test]
    fn parenting_rejects_cycles() {
        let mut graph = FieldGraph::default();
        graph.set_parent(OwnerId(2), OwnerId(1)).unwrap();
        assert_eq!(
            graph.set_parent(OwnerId(1), OwnerId(2)),
            Err(GraphError::HierarchyCycle {
                child: OwnerId(1),
                parent: OwnerId(2)
            })
        );
        assert!(graph.set_parent(OwnerId(1), OwnerId(1)).is_err());
    }

    #[test]
    fn remove_owner_removes_all_its_fields() {
        let mut graph = FieldGraph::default();
        let doomed = OwnerId(5);
        let src = graph.add_input(doomed, None, ValueKind::Bool, 1);
        graph
            .add_gate(doomed, HOVERED, ValueKind::Bool, MergePolicy::Additive, src)
            .unwrap();
        let kept = graph.add_input(OWNER, None, ValueKind::Bool, 0);
        settle(&mut graph);

        assert_eq!(graph.remove_owner(doomed), 2);
        assert_eq!(graph.find_output(doomed, HOVERED), None);
        assert!(graph.is_live(kept));
        settle(&mut graph);
        assert_eq!(graph.order().collect::<Vec<_>>(), vec![kept]);
    }

    #[test]
    fn set_input_checks_kind() {
        let mut graph = FieldGraph::default();
        let konst = graph.add_constant(OWNER, ValueKind::Bool, 1);
        assert_eq!(graph.set_input(konst, 0), Err(GraphError::NotAnInput { field: konst }));
        let input = graph.add_input(OWNER, None, ValueKind::Enum { cardinality: 3 }, 0);
        assert!(graph.set_input(input, 3).is_err());
        assert!(graph.set_input(input, 2).is_ok());
    }

    #[test]
    fn field_stats_describe_slot() {
        let mut graph = FieldGraph::default();
        let src = graph.add_input(OWNER, None, ValueKind::Bool, 1);
        let proxy = graph.add_proxy(OWNER, src).unwrap();
        settle(&mut graph);

        let stats = graph.field_stats(proxy).unwrap();
        assert_eq!(stats.kind, "proxy");
        assert!(stats.is_proxy);
        assert_eq!(stats.upstream, 1);
        assert_eq!(stats.value, 1);
        assert_eq!(graph.field_stats(src).unwrap().downstream, 1);
    }
}
