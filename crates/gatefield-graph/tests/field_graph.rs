//! Integration tests for `FieldGraph`: ordering, cycles, incrementality and
//! budgeted sorting, driven through the public API only.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use gatefield_core::gate::MergePolicy;
use gatefield_core::id::{FieldHandle, FieldId, OwnerId};
use gatefield_core::value::{ValueKind, EMPTY};
use gatefield_graph::{FieldGraph, GraphConfig, GraphError, RefreshReport};
use petgraph::algo::is_cyclic_directed;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const OWNER: OwnerId = OwnerId(0);

fn settle(graph: &mut FieldGraph) -> RefreshReport {
    for _ in 0..10_000 {
        let report = graph.refresh().expect("refresh should succeed");
        if report.stable {
            return report;
        }
    }
    panic!("graph never stabilized");
}

fn positions(graph: &FieldGraph) -> HashMap<FieldHandle, usize> {
    graph.order().enumerate().map(|(i, h)| (h, i)).collect()
}

/// Every dependency edge points forward in the order.
fn assert_topological(graph: &FieldGraph) {
    let pos = positions(graph);
    let dg = graph.dependency_graph();
    for edge in dg.edge_references() {
        let from = dg[edge.source()].handle();
        let to = dg[edge.target()].handle();
        assert!(
            pos[&from] < pos[&to],
            "{from} must precede {to} in the order"
        );
    }
}

/// Bool outputs `0..outputs`, each OR-gated from the listed inputs and from
/// outputs with a higher index, so the sorter has to reorder them.
struct Layered {
    graph: FieldGraph,
    inputs: Vec<FieldHandle>,
    outputs: Vec<FieldHandle>,
}

fn layered(inputs: &[bool], links: &[(usize, usize)], from_inputs: &[(usize, usize)]) -> Layered {
    let mut graph = FieldGraph::default();
    let input_handles: Vec<FieldHandle> = inputs
        .iter()
        .map(|on| graph.add_input(OWNER, None, ValueKind::Bool, i32::from(*on)))
        .collect();
    let count = links
        .iter()
        .flat_map(|(a, b)| [*a, *b])
        .chain(from_inputs.iter().map(|(_, o)| *o))
        .max()
        .map_or(0, |m| m + 1);
    let outputs: Vec<FieldHandle> = (0..count)
        .map(|k| graph.output_field(OWNER, FieldId(k as u32), ValueKind::Bool).unwrap())
        .collect();
    for (input, output) in from_inputs {
        graph
            .add_gate(OWNER, FieldId(*output as u32), ValueKind::Bool, MergePolicy::Additive, input_handles[*input])
            .unwrap();
    }
    for (source, target) in links {
        graph
            .add_gate(OWNER, FieldId(*target as u32), ValueKind::Bool, MergePolicy::Additive, outputs[*source])
            .unwrap();
    }
    Layered {
        graph,
        inputs: input_handles,
        outputs,
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[test]
fn later_created_upstream_is_sorted_first() {
    // out0 <- out1 <- out2 <- input
    let mut l = layered(&[true], &[(1, 0), (2, 1)], &[(0, 2)]);
    settle(&mut l.graph);
    assert_topological(&l.graph);
    for out in &l.outputs {
        assert_eq!(l.graph.value(*out), Some(1));
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn acyclic_graphs_sort_and_evaluate(
        inputs in proptest::collection::vec(any::<bool>(), 1..5),
        raw_links in proptest::collection::vec((0usize..12, 0usize..12), 0..24),
        raw_feeds in proptest::collection::vec((0usize..5, 0usize..12), 0..8),
    ) {
        // Keep only edges from a higher output to a lower one: acyclic.
        let links: Vec<(usize, usize)> = raw_links
            .into_iter()
            .filter(|(a, b)| a > b)
            .collect();
        let feeds: Vec<(usize, usize)> = raw_feeds
            .into_iter()
            .map(|(i, o)| (i % inputs.len(), o))
            .collect();
        let mut l = layered(&inputs, &links, &feeds);
        settle(&mut l.graph);
        assert_topological(&l.graph);
        prop_assert!(l.graph.last_cycles().is_empty());

        // Expected values, computed from the highest output down.
        let mut expected = vec![false; l.outputs.len()];
        for k in (0..l.outputs.len()).rev() {
            let fed = feeds.iter().any(|(i, o)| *o == k && inputs[*i]);
            let linked = links.iter().any(|(s, t)| *t == k && expected[*s]);
            expected[k] = fed || linked;
        }
        for (k, out) in l.outputs.iter().enumerate() {
            prop_assert_eq!(l.graph.value(*out), Some(i32::from(expected[k])));
        }
    }

    #[test]
    fn cycles_are_tolerated_and_reported(
        raw_links in proptest::collection::vec((0usize..8, 0usize..8), 1..16),
    ) {
        let links: Vec<(usize, usize)> = raw_links.into_iter().filter(|(a, b)| a != b).collect();
        let mut l = layered(&[true], &links, &[(0, 0)]);
        settle(&mut l.graph);

        prop_assert!(l.graph.is_stable());
        prop_assert_eq!(l.graph.order().count(), l.graph.field_count());
        let cyclic = is_cyclic_directed(l.graph.dependency_graph());
        prop_assert_eq!(cyclic, !l.graph.last_cycles().is_empty());
        if !cyclic {
            assert_topological(&l.graph);
        }
    }
}

// ---------------------------------------------------------------------------
// Cycles
// ---------------------------------------------------------------------------

#[test]
fn two_field_cycle_still_evaluates() {
    let mut l = layered(&[true], &[(0, 1), (1, 0)], &[(0, 0)]);
    let report = settle(&mut l.graph);
    assert_eq!(report.cycles.len(), 1);
    assert!(l.graph.field_count() == l.graph.order().count());

    // Both outputs settle on true once the cycle has been walked again.
    settle(&mut l.graph);
    assert_eq!(l.graph.value(l.outputs[0]), Some(1));
    assert_eq!(l.graph.value(l.outputs[1]), Some(1));
}

#[test]
fn strict_mode_fails_on_cycles() {
    let mut graph = FieldGraph::new(GraphConfig {
        strict_cycles: true,
        ..GraphConfig::default()
    });
    let a = graph.output_field(OWNER, FieldId(0), ValueKind::Bool).unwrap();
    let b = graph.output_field(OWNER, FieldId(1), ValueKind::Bool).unwrap();
    graph
        .add_gate(OWNER, FieldId(0), ValueKind::Bool, MergePolicy::Additive, b)
        .unwrap();
    graph
        .add_gate(OWNER, FieldId(1), ValueKind::Bool, MergePolicy::Additive, a)
        .unwrap();

    let err = graph.refresh().unwrap_err();
    assert!(matches!(err, GraphError::CycleDetected { count: 1, .. }));
    // The cycle persists, so does the error.
    assert!(graph.refresh().is_err());
    assert_eq!(graph.value(a), Some(EMPTY));

    // Breaking the cycle clears it.
    assert_eq!(graph.remove_gates(a, b), Ok(1));
    assert!(graph.refresh().is_ok());
    assert_eq!(graph.value(a), Some(0));
}

// ---------------------------------------------------------------------------
// Incrementality
// ---------------------------------------------------------------------------

#[test]
fn untouched_island_is_not_recomputed() {
    let mut graph = FieldGraph::default();
    let left_in = graph.add_input(OwnerId(1), None, ValueKind::Bool, 0);
    let left_out = graph
        .add_gate(OwnerId(1), FieldId(0), ValueKind::Bool, MergePolicy::Additive, left_in)
        .unwrap();
    let right_in = graph.add_input(OwnerId(2), None, ValueKind::Bool, 0);
    let right_out = graph
        .add_gate(OwnerId(2), FieldId(0), ValueKind::Bool, MergePolicy::Additive, right_in)
        .unwrap();
    settle(&mut graph);
    assert_eq!(graph.island_count(), 2);
    let passes = graph.sort_stats().passes;
    let right_before = graph.field_stats(right_out).unwrap().recomputes;
    let left_before = graph.field_stats(left_out).unwrap().recomputes;

    graph.set_input(left_in, 1).unwrap();
    let report = settle(&mut graph);

    assert_eq!(graph.value(left_out), Some(1));
    assert_eq!(graph.field_stats(left_out).unwrap().recomputes, left_before + 1);
    assert_eq!(graph.field_stats(right_out).unwrap().recomputes, right_before);
    assert_eq!(report.recomputed, 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(graph.sort_stats().passes, passes, "value changes do not re-sort");
}

#[test]
fn refresh_is_idempotent() {
    let mut l = layered(&[true, false], &[(2, 1), (1, 0)], &[(0, 2), (1, 0)]);
    settle(&mut l.graph);
    l.graph.take_changes();
    let order: Vec<FieldHandle> = l.graph.order().collect();
    let values: Vec<Option<i32>> = l.outputs.iter().map(|o| l.graph.value(*o)).collect();

    let report = l.graph.refresh().unwrap();
    assert!(report.stable);
    assert_eq!(report.sort_ops, 0);
    assert_eq!(report.recomputed, 0);
    assert!(l.graph.take_changes().is_empty());
    assert_eq!(l.graph.order().collect::<Vec<_>>(), order);
    let again: Vec<Option<i32>> = l.outputs.iter().map(|o| l.graph.value(*o)).collect();
    assert_eq!(again, values);
    assert_eq!(l.inputs.len(), 2);
}

#[test]
fn sampled_fields_are_polled_every_refresh() {
    let source = Rc::new(Cell::new(0));
    let mut graph = FieldGraph::default();
    let reader = Rc::clone(&source);
    let sampled = graph.add_sampled(OWNER, ValueKind::Bool, move || reader.get());
    let proxy = graph.add_proxy(OWNER, sampled).unwrap();
    let out = graph
        .add_gate(OWNER, FieldId(0), ValueKind::Bool, MergePolicy::Additive, proxy)
        .unwrap();
    settle(&mut graph);
    assert_eq!(graph.value(out), Some(0));

    source.set(1);
    let report = graph.refresh().unwrap();
    assert_eq!(graph.value(out), Some(1));
    assert_eq!(report.changed, 3);

    let report = graph.refresh().unwrap();
    assert_eq!(report.recomputed, 1, "only the sampled field is polled");
    assert_eq!(report.changed, 0);
}

#[test]
fn changes_carry_owner_and_definition() {
    let mut graph = FieldGraph::default();
    let input = graph.add_input(OwnerId(4), None, ValueKind::Enum { cardinality: 4 }, 0);
    let out = graph
        .add_gate(OwnerId(4), FieldId(9), ValueKind::Enum { cardinality: 4 }, MergePolicy::Unset, input)
        .unwrap();
    settle(&mut graph);
    graph.take_changes();

    graph.set_input(input, 2).unwrap();
    settle(&mut graph);
    let changes = graph.take_changes();
    let output_change = changes.iter().find(|c| c.field == out).unwrap();
    assert_eq!(output_change.owner, OwnerId(4));
    assert_eq!(output_change.def, Some(FieldId(9)));
    assert_eq!((output_change.old, output_change.new), (0, 2));
}

// ---------------------------------------------------------------------------
// Budgets
// ---------------------------------------------------------------------------

fn chain(graph: &mut FieldGraph, len: usize) -> (FieldHandle, FieldHandle) {
    let first = graph.add_input(OWNER, None, ValueKind::Bool, 1);
    let mut last = first;
    for _ in 0..len {
        last = graph.add_not(OWNER, last).unwrap();
    }
    (first, last)
}

#[test]
fn budget_defers_value_refresh() {
    let mut graph = FieldGraph::new(GraphConfig {
        op_budget: 4,
        ..GraphConfig::default()
    });
    let (_, last) = chain(&mut graph, 20);

    let first = graph.refresh().unwrap();
    assert!(!first.stable);
    assert!(first.sort_ops <= 4);
    assert_eq!(graph.value(last), Some(EMPTY), "values wait for a stable order");

    settle(&mut graph);
    assert_topological(&graph);
    // 20 negations of true.
    assert_eq!(graph.value(last), Some(1));
}

#[test]
fn topology_change_mid_sort_restarts_the_pass() {
    let mut graph = FieldGraph::new(GraphConfig {
        op_budget: 4,
        ..GraphConfig::default()
    });
    let (first, _) = chain(&mut graph, 10);
    assert!(!graph.refresh().unwrap().stable);

    let extra = graph.add_not(OWNER, first).unwrap();
    settle(&mut graph);

    let stats = graph.sort_stats();
    assert!(stats.restarts >= 1);
    assert_eq!(stats.passes, 1);
    assert_eq!(graph.value(extra), Some(0));
    assert_topological(&graph);
}

#[test]
fn removal_mid_sort_is_skipped_and_restarts_the_pass() {
    let mut graph = FieldGraph::new(GraphConfig {
        op_budget: 3,
        ..GraphConfig::default()
    });
    let mut links = vec![graph.add_input(OWNER, None, ValueKind::Bool, 1)];
    for i in 0..10 {
        let next = graph.add_not(OWNER, links[i]).unwrap();
        links.push(next);
    }
    assert!(!graph.refresh().unwrap().stable);

    // The suspended pass still holds the removed field on its stack and in
    // its readers' upstream snapshots.
    graph.remove_field(links[5]).unwrap();
    settle(&mut graph);

    let stats = graph.sort_stats();
    assert!(stats.restarts >= 1);
    assert!(!graph.is_live(links[5]));
    assert!(graph.order().all(|field| field != links[5]));
    assert_eq!(graph.order().count(), 10);
    assert_eq!(graph.field_count(), 10);
    assert_topological(&graph);
    // Fields upstream of the gap still evaluate normally.
    assert_eq!(graph.value(links[4]), Some(1));
}
