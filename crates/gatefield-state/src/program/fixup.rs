//! The fix-up pass: turns a flat step list into a well-formed [`StepProgram`].

use std::collections::{HashMap, HashSet};

use gatefield_core::id::{StateId, StepId};
use gatefield_core::step::{Step, StepKind};

use super::{ProgramNode, Repair, StepProgram};

impl StepProgram {
    /// Builds a program from `steps`, repairing what it can.
    ///
    /// With `fallback` set (node programs), a root `Result` for that state is
    /// appended when no root result exists, so evaluation can never come up
    /// empty. Shared programs pass `None`: an empty result from them is how a
    /// reference step falls through to its next sibling.
    pub fn build(name: &str, steps: Vec<Step>, fallback: Option<StateId>) -> StepProgram {
        let mut repairs = Vec::new();
        let mut steps = steps;

        // Duplicate ids: the first occurrence keeps its id.
        let mut ids = StepIds::new(&steps);
        let mut seen = HashSet::new();
        for step in &mut steps {
            if !seen.insert(step.id) {
                let new = ids.fresh();
                repairs.push(Repair::DuplicateId { old: step.id, new });
                step.id = new;
            }
        }

        let index_of: HashMap<StepId, usize> =
            steps.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
        let mut roots = Vec::new();
        for (i, step) in steps.iter().enumerate() {
            match step.parent {
                None => roots.push(i),
                Some(parent) => {
                    if let Some(&p) = index_of.get(&parent) {
                        if p != i {
                            children[p].push(i);
                        }
                    }
                }
            }
        }

        // Copy reachable steps out in pre-order. Parent links form a forest
        // under the roots, so this walk cannot loop.
        let mut nodes: Vec<ProgramNode> = Vec::with_capacity(steps.len());
        let mut taken = vec![false; steps.len()];
        let new_roots: Vec<usize> = roots
            .iter()
            .map(|r| copy_subtree(*r, &steps, &children, &mut taken, &mut nodes))
            .collect();

        for (i, step) in steps.iter().enumerate() {
            if taken[i] {
                continue;
            }
            if let Some(parent) = step.parent {
                repairs.push(Repair::Orphan {
                    step: step.id,
                    parent,
                });
            }
        }

        for node in &nodes {
            let terminal = !matches!(node.step.kind, StepKind::Condition { .. });
            if terminal && !node.children.is_empty() {
                repairs.push(Repair::UnreachableChildren {
                    step: node.step.id,
                    count: node.children.len(),
                });
            }
        }

        let mut program = StepProgram {
            name: name.to_string(),
            nodes,
            roots: new_roots,
            repairs: Vec::new(),
        };

        if let Some(state) = fallback {
            if !program.has_fallback() {
                let index = program.nodes.len();
                program.nodes.push(ProgramNode {
                    step: Step::result(ids.fresh().0, None, state),
                    children: Vec::new(),
                });
                program.roots.push(index);
                repairs.push(Repair::FallbackAppended { state });
            }
        }

        for repair in &repairs {
            tracing::warn!("program '{}': {}", name, repair);
        }
        program.repairs = repairs;
        program
    }
}

/// Hands out step ids no step in a list uses yet.
pub(crate) struct StepIds {
    used: HashSet<u32>,
    /// Next id above the largest one taken; `None` once `u32::MAX` is used.
    next: Option<u32>,
}

impl StepIds {
    pub(crate) fn new(steps: &[Step]) -> Self {
        let used: HashSet<u32> = steps.iter().map(|s| s.id.0).collect();
        let next = match used.iter().max() {
            Some(max) => max.checked_add(1),
            None => Some(0),
        };
        StepIds { used, next }
    }

    /// One past the largest id while there is room, else the lowest free id.
    pub(crate) fn fresh(&mut self) -> StepId {
        let id = match self.next {
            Some(id) => {
                self.next = id.checked_add(1);
                id
            }
            None => (0..=u32::MAX)
                .find(|id| !self.used.contains(id))
                .unwrap_or(u32::MAX),
        };
        self.used.insert(id);
        StepId(id)
    }
}

fn copy_subtree(
    index: usize,
    steps: &[Step],
    children: &[Vec<usize>],
    taken: &mut [bool],
    out: &mut Vec<ProgramNode>,
) -> usize {
    let position = out.len();
    taken[index] = true;
    out.push(ProgramNode {
        step: steps[index].clone(),
        children: Vec::new(),
    });
    let kids: Vec<usize> = children[index]
        .iter()
        .map(|c| copy_subtree(*c, steps, children, taken, out))
        .collect();
    out[position].children = kids;
    position
}
