//! Value change notifications.

use gatefield_core::id::{FieldHandle, FieldId, OwnerId};
use serde::Serialize;

use crate::sort::CyclePoint;

/// A field whose cached value changed during a refresh.
///
/// `old` is `EMPTY` the first time a field publishes a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValueChange {
    pub field: FieldHandle,
    pub owner: OwnerId,
    pub def: Option<FieldId>,
    pub old: i32,
    pub new: i32,
}

/// What one [`FieldGraph::refresh`](crate::graph::FieldGraph::refresh) did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// True if the sort was stable and values were refreshed.
    pub stable: bool,
    /// True if any field's upstream set changed this refresh.
    pub topology_changed: bool,
    /// Sort operations spent this refresh.
    pub sort_ops: u64,
    pub recomputed: usize,
    pub skipped: usize,
    pub changed: usize,
    /// Cycle points found by a sort pass that completed this refresh.
    pub cycles: Vec<CyclePoint>,
}

/// Per-field diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldStats {
    pub field: FieldHandle,
    pub owner: OwnerId,
    pub kind: &'static str,
    pub value: i32,
    pub upstream: usize,
    pub downstream: usize,
    pub recomputes: u64,
    pub is_proxy: bool,
}
