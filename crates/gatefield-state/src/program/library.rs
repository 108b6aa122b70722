//! Shared programs addressable by `Reference` steps.

use std::collections::HashMap;

use gatefield_core::id::ProgramId;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;

use super::{Repair, StepProgram};

#[derive(Debug, Clone, Default)]
pub struct ProgramLibrary {
    programs: HashMap<ProgramId, StepProgram>,
}

impl ProgramLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a program. Returns the replaced one.
    pub fn insert(&mut self, id: ProgramId, program: StepProgram) -> Option<StepProgram> {
        self.programs.insert(id, program)
    }

    pub fn get(&self, id: ProgramId) -> Option<&StepProgram> {
        self.programs.get(&id)
    }

    pub fn contains(&self, id: ProgramId) -> bool {
        self.programs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Programs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ProgramId, &StepProgram)> {
        let mut ids: Vec<ProgramId> = self.programs.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(move |id| self.programs.get(&id).map(|program| (id, program)))
    }

    /// Reference steps in `program` naming programs this library lacks.
    ///
    /// Such references stay in place and evaluate to no result.
    pub fn missing_references(&self, program: &StepProgram) -> Vec<Repair> {
        program
            .references()
            .filter(|(_, target)| !self.contains(*target))
            .map(|(step, target)| Repair::MissingProgram {
                step,
                program: target,
            })
            .collect()
    }

    /// Groups of programs that reference each other in a loop.
    ///
    /// Evaluation of such programs is cut off by the reference depth bound.
    pub fn reference_cycles(&self) -> Vec<Vec<ProgramId>> {
        let mut graph: DiGraphMap<ProgramId, ()> = DiGraphMap::new();
        for (id, program) in &self.programs {
            graph.add_node(*id);
            for (_, target) in program.references() {
                graph.add_edge(*id, target, ());
            }
        }
        let mut cycles: Vec<Vec<ProgramId>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .map(|mut scc| {
                scc.sort_unstable();
                scc
            })
            .collect();
        cycles.sort_unstable();
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatefield_core::id::{FieldId, StateId, StepId};
    use gatefield_core::step::Step;

    fn shared(name: &str, steps: Vec<Step>) -> StepProgram {
        StepProgram::build(name, steps, None)
    }

    #[test]
    fn missing_references_are_listed() {
        let mut library = ProgramLibrary::new();
        library.insert(ProgramId(0), shared("base", vec![Step::result(1, None, StateId(0))]));
        let user = shared(
            "user",
            vec![
                Step::reference(1, None, ProgramId(0)),
                Step::reference(2, None, ProgramId(7)),
            ],
        );
        let missing = library.missing_references(&user);
        assert_eq!(
            missing,
            vec![Repair::MissingProgram {
                step: StepId(2),
                program: ProgramId(7)
            }]
        );
    }

    #[test]
    fn reference_loops_are_found() {
        let mut library = ProgramLibrary::new();
        library.insert(ProgramId(0), shared("a", vec![Step::reference(1, None, ProgramId(1))]));
        library.insert(ProgramId(1), shared("b", vec![Step::reference(1, None, ProgramId(0))]));
        library.insert(ProgramId(2), shared("c", vec![Step::reference(1, None, ProgramId(2))]));
        library.insert(
            ProgramId(3),
            shared("d", vec![Step::condition(1, None, FieldId(0), 1)]),
        );
        assert_eq!(
            library.reference_cycles(),
            vec![vec![ProgramId(0), ProgramId(1)], vec![ProgramId(2)]]
        );
    }
}
