//! Resumable, island-scoped topological sort.
//!
//! The sorter keeps one global order of every field. A pass re-sorts only
//! the fields of dirty islands: it runs an iterative depth-first search from
//! each dirty field along upstream edges and moves every field to the end of
//! the order when its post-order marker is popped. Fields of clean islands
//! keep their relative positions.
//!
//! # Budgets
//!
//! [`TopoSorter::step`] performs at most `budget` stack operations and then
//! yields, leaving the pass suspended. The next call resumes it unless the
//! island map changed in between, in which case the pass is abandoned and a
//! new one starts. Operations are counted across restarts in [`SortStats`].
//!
//! # Cycles
//!
//! When the search reaches an upstream field that is still on the current
//! path, the edge closes a cycle. It is recorded as a [`CyclePoint`] and
//! skipped; the rest of the pass proceeds, so every field still gets a
//! position.

use std::collections::{HashMap, HashSet};
use std::mem;

use gatefield_core::id::{FieldHandle, OwnerId};
use indexmap::IndexSet;
use serde::Serialize;
use tracing::debug;

use crate::islands::{Color, Islands};

/// Read-only view of the dependency structure the sorter walks.
pub trait DependencySource {
    fn is_live(&self, field: FieldHandle) -> bool;

    /// Upstream snapshot of `field`; empty for stale handles.
    fn upstream_of(&self, field: FieldHandle) -> &[FieldHandle];

    /// Every live field, in a stable order.
    fn live_fields(&self) -> Vec<FieldHandle>;

    fn owner_of(&self, field: FieldHandle) -> Option<OwnerId>;
}

/// An edge found closing a dependency cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CyclePoint {
    /// The upstream field that was still on the search path.
    pub field: FieldHandle,
    /// The field whose dependency closed the cycle.
    pub dependent: FieldHandle,
    /// Owner of `dependent`.
    pub owner: Option<OwnerId>,
}

/// Outcome of one [`TopoSorter::step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortProgress {
    /// Nothing was dirty.
    Idle,
    /// Budget ran out; the pass is suspended.
    Yielded { ops: u64 },
    /// The pass finished. `cycles` counts cycle points found.
    Completed { ops: u64, cycles: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SortStats {
    /// Stack operations performed, across restarts.
    pub total_ops: u64,
    /// Completed passes.
    pub passes: u64,
    /// Passes abandoned because the island map changed mid-pass.
    pub restarts: u64,
}

#[derive(Debug)]
struct SortPass {
    /// Remaining dirty roots, popped from the back.
    seeds: Vec<FieldHandle>,
    /// `(post, field)`: post-order markers are `true`.
    stack: Vec<(bool, FieldHandle)>,
    visited: HashSet<FieldHandle>,
    on_stack: HashSet<FieldHandle>,
    /// Island map being built by this pass.
    next: Islands,
    current: Color,
    cycles: Vec<CyclePoint>,
    /// Island epoch the pass was started against.
    started_at: u64,
}

impl SortPass {
    fn is_done(&self) -> bool {
        self.stack.is_empty() && self.seeds.is_empty()
    }
}

#[derive(Debug)]
enum SortState {
    Idle,
    Scanning(Box<SortPass>),
}

#[derive(Debug)]
pub struct TopoSorter {
    state: SortState,
    order: IndexSet<FieldHandle>,
    islands: Islands,
    last_cycles: Vec<CyclePoint>,
    stats: SortStats,
}

impl Default for TopoSorter {
    fn default() -> Self {
        Self::new()
    }
}

impl TopoSorter {
    pub fn new() -> Self {
        TopoSorter {
            state: SortState::Idle,
            order: IndexSet::new(),
            islands: Islands::new(),
            last_cycles: Vec::new(),
            stats: SortStats::default(),
        }
    }

    /// Current global order. Only topologically valid once [`is_stable`](Self::is_stable).
    pub fn order(&self) -> &IndexSet<FieldHandle> {
        &self.order
    }

    /// True when no pass is running and no island is dirty.
    pub fn is_stable(&self) -> bool {
        matches!(self.state, SortState::Idle) && !self.islands.has_dirty()
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self.state, SortState::Scanning(_))
    }

    pub fn stats(&self) -> SortStats {
        self.stats
    }

    /// Cycle points found by the most recent completed pass.
    pub fn last_cycles(&self) -> &[CyclePoint] {
        &self.last_cycles
    }

    pub fn mark_dirty(&mut self, field: FieldHandle) {
        self.islands.mark_dirty(field);
    }

    /// Records a dependency edge between two fields.
    pub fn connect(&mut self, upstream: FieldHandle, dependent: FieldHandle) {
        self.islands.connect(upstream, dependent);
    }

    /// Forgets a removed field.
    pub fn forget(&mut self, field: FieldHandle) {
        self.islands.forget(field);
        self.order.shift_remove(&field);
    }

    pub fn island_count(&mut self) -> usize {
        self.islands.island_count()
    }

    pub fn dirty_islands(&self) -> usize {
        self.islands.dirty_count()
    }

    pub fn same_island(&mut self, a: FieldHandle, b: FieldHandle) -> bool {
        self.islands.same_island(a, b)
    }

    /// Advances the sort by at most `budget` operations.
    pub fn step<S>(&mut self, source: &S, budget: usize) -> SortProgress
    where
        S: DependencySource + ?Sized,
    {
        let budget = budget.max(1) as u64;

        if let SortState::Scanning(pass) = &self.state {
            if pass.started_at != self.islands.epoch() {
                debug!(
                    epoch = self.islands.epoch(),
                    started_at = pass.started_at,
                    "island map changed mid-sort, restarting pass"
                );
                self.stats.restarts += 1;
                self.state = SortState::Idle;
            }
        }

        if matches!(self.state, SortState::Idle) {
            if !self.islands.has_dirty() {
                return SortProgress::Idle;
            }
            let pass = self.begin_pass(source);
            self.state = SortState::Scanning(Box::new(pass));
        }

        let ops = match &mut self.state {
            SortState::Scanning(pass) => scan(pass, source, &mut self.order, budget),
            SortState::Idle => return SortProgress::Idle,
        };
        self.stats.total_ops += ops;

        let done = matches!(&self.state, SortState::Scanning(pass) if pass.is_done());
        if !done {
            return SortProgress::Yielded { ops };
        }
        if let SortState::Scanning(pass) = mem::replace(&mut self.state, SortState::Idle) {
            self.finish(*pass, source);
        }
        SortProgress::Completed {
            ops,
            cycles: self.last_cycles.len(),
        }
    }

    /// Runs passes until stable. Returns the total operations spent.
    pub fn sort_to_completion<S>(&mut self, source: &S) -> u64
    where
        S: DependencySource + ?Sized,
    {
        let mut total = 0;
        loop {
            match self.step(source, usize::MAX) {
                SortProgress::Idle => return total,
                SortProgress::Yielded { ops } | SortProgress::Completed { ops, .. } => total += ops,
            }
        }
    }

    fn begin_pass<S>(&mut self, source: &S) -> SortPass
    where
        S: DependencySource + ?Sized,
    {
        let mut seeds: Vec<FieldHandle> = source
            .live_fields()
            .into_iter()
            .filter(|f| self.islands.is_dirty(*f))
            .collect();
        seeds.reverse();
        debug!(seeds = seeds.len(), dirty_islands = self.islands.dirty_count(), "sort pass started");

        let mut next = Islands::new();
        let current = next.fresh_color();
        SortPass {
            seeds,
            stack: Vec::new(),
            visited: HashSet::new(),
            on_stack: HashSet::new(),
            next,
            current,
            cycles: Vec::new(),
            started_at: self.islands.epoch(),
        }
    }

    /// Installs the island map built by a finished pass, carrying over the
    /// colors of islands the pass did not touch.
    fn finish<S>(&mut self, mut pass: SortPass, source: &S)
    where
        S: DependencySource + ?Sized,
    {
        let mut carried: HashMap<Color, Color> = HashMap::new();
        for (field, color) in self.islands.entries() {
            if pass.next.color_of(field).is_some() || !source.is_live(field) {
                continue;
            }
            let root = self.islands.find(color);
            let next = &mut pass.next;
            let new = *carried.entry(root).or_insert_with(|| next.fresh_color());
            next.assign(field, new);
        }

        pass.next.compact();
        pass.next.set_epoch(self.islands.epoch());
        self.islands = pass.next;
        self.last_cycles = pass.cycles;
        self.stats.passes += 1;
        debug!(
            fields = self.order.len(),
            islands = self.islands.island_count(),
            cycles = self.last_cycles.len(),
            "sort pass completed"
        );
    }
}

/// Runs the suspended search for up to `budget` operations.
fn scan<S>(pass: &mut SortPass, source: &S, order: &mut IndexSet<FieldHandle>, budget: u64) -> u64
where
    S: DependencySource + ?Sized,
{
    let mut ops = 0;
    while ops < budget {
        let Some((post, field)) = pass.stack.pop() else {
            // Start the next search tree from a remaining seed.
            let Some(seed) = pass.seeds.pop() else {
                break;
            };
            if !pass.visited.contains(&seed) {
                pass.current = pass.next.fresh_color();
                pass.stack.push((false, seed));
            }
            continue;
        };
        ops += 1;

        if post {
            pass.on_stack.remove(&field);
            order.shift_remove(&field);
            order.insert(field);
            pass.next.assign(field, pass.current);
            continue;
        }

        if pass.visited.contains(&field) || !source.is_live(field) {
            continue;
        }
        pass.visited.insert(field);
        pass.on_stack.insert(field);
        pass.stack.push((true, field));

        for upstream in source.upstream_of(field).iter().rev() {
            if !source.is_live(*upstream) {
                continue;
            }
            if !pass.visited.contains(upstream) {
                pass.stack.push((false, *upstream));
            } else if pass.on_stack.contains(upstream) {
                pass.cycles.push(CyclePoint {
                    field: *upstream,
                    dependent: field,
                    owner: source.owner_of(field),
                });
            } else if let Some(color) = pass.next.color_of(*upstream) {
                pass.current = pass.next.union(color, pass.current);
            }
        }
    }
    ops
}
