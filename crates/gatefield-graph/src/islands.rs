//! Island coloring: union-find over connected groups of fields.
//!
//! Fields connected by any dependency edge share a color. Dirtiness is
//! tracked per island rather than per field: touching one field of an island
//! schedules the whole island for re-sorting, and clean islands are skipped
//! entirely. Colors are only ever merged between full sorts; splitting an
//! island happens implicitly when the sorter rebuilds the map from scratch.

use std::collections::{BTreeMap, HashMap, HashSet};

use gatefield_core::id::FieldHandle;

/// Island identifier. Only canonical (root) colors are meaningful.
pub type Color = u32;

#[derive(Debug, Clone, Default)]
pub struct Islands {
    colors: HashMap<FieldHandle, Color>,
    /// Union-find parent links, indexed by color.
    parent: Vec<Color>,
    /// Canonical colors of islands awaiting a sort.
    dirty: HashSet<Color>,
    /// Bumped on every mutation that can invalidate an in-flight sort.
    epoch: u64,
}

impl Islands {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self) -> Color {
        let color = self.parent.len() as Color;
        self.parent.push(color);
        color
    }

    /// Canonical color of `color`, compressing the path on the way.
    pub fn find(&mut self, color: Color) -> Color {
        let mut root = color;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut cur = color;
        while self.parent[cur as usize] != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        root
    }

    /// Merges two islands. The smaller color becomes canonical and the
    /// merged island is dirty if either side was.
    pub fn union(&mut self, a: Color, b: Color) -> Color {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return ra;
        }
        let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[child as usize] = root;
        if self.dirty.remove(&child) {
            self.dirty.insert(root);
        }
        root
    }

    pub fn color_of(&self, field: FieldHandle) -> Option<Color> {
        self.colors.get(&field).copied()
    }

    /// Returns the field's color, creating a fresh dirty island if uncolored.
    pub fn ensure(&mut self, field: FieldHandle) -> Color {
        if let Some(color) = self.colors.get(&field) {
            return *color;
        }
        let color = self.alloc();
        self.colors.insert(field, color);
        self.dirty.insert(color);
        self.epoch += 1;
        color
    }

    /// Schedules the field's island for re-sorting.
    pub fn mark_dirty(&mut self, field: FieldHandle) {
        let color = self.ensure(field);
        let root = self.find(color);
        self.dirty.insert(root);
        self.epoch += 1;
    }

    /// Records a new edge between two fields: their islands merge and the
    /// result is dirty.
    pub fn connect(&mut self, a: FieldHandle, b: FieldHandle) {
        let ca = self.ensure(a);
        let cb = self.ensure(b);
        let root = self.union(ca, cb);
        self.dirty.insert(root);
        self.epoch += 1;
    }

    /// Drops a removed field. Its former island is re-sorted so the split
    /// can take effect.
    pub fn forget(&mut self, field: FieldHandle) {
        if let Some(color) = self.colors.remove(&field) {
            let root = self.find(color);
            self.dirty.insert(root);
            self.epoch += 1;
        }
    }

    /// Uncolored fields count as dirty.
    pub fn is_dirty(&mut self, field: FieldHandle) -> bool {
        match self.colors.get(&field).copied() {
            None => true,
            Some(color) => {
                let root = self.find(color);
                self.dirty.contains(&root)
            }
        }
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn same_island(&mut self, a: FieldHandle, b: FieldHandle) -> bool {
        match (self.color_of(a), self.color_of(b)) {
            (Some(ca), Some(cb)) => self.find(ca) == self.find(cb),
            _ => false,
        }
    }

    /// Number of distinct islands among colored fields.
    pub fn island_count(&mut self) -> usize {
        let colors: Vec<Color> = self.colors.values().copied().collect();
        colors
            .into_iter()
            .map(|c| self.find(c))
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn field_count(&self) -> usize {
        self.colors.len()
    }

    /// Snapshot of every colored field with its color, for carrying clean
    /// islands across a rebuild.
    pub(crate) fn entries(&self) -> Vec<(FieldHandle, Color)> {
        self.colors.iter().map(|(f, c)| (*f, *c)).collect()
    }

    /// Allocates a clean color. Used while building a replacement map.
    pub(crate) fn fresh_color(&mut self) -> Color {
        self.alloc()
    }

    /// Colors a field directly, without touching dirtiness.
    pub(crate) fn assign(&mut self, field: FieldHandle, color: Color) {
        self.colors.insert(field, color);
    }

    pub(crate) fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    /// Renumbers canonical colors densely and flattens the forest.
    pub(crate) fn compact(&mut self) {
        let entries = self.entries();
        let mut remap: BTreeMap<Color, Color> = BTreeMap::new();
        for (_, color) in &entries {
            let root = self.find(*color);
            remap.insert(root, 0);
        }
        for (next, slot) in remap.values_mut().enumerate() {
            *slot = next as Color;
        }

        let mut dirty = HashSet::new();
        for old in &self.dirty {
            if let Some(new) = remap.get(old) {
                dirty.insert(*new);
            }
        }
        for (field, color) in entries {
            let root = self.find(color);
            self.colors.insert(field, remap[&root]);
        }
        self.parent = (0..remap.len() as Color).collect();
        self.dirty = dirty;
    }
}
