//! Step evaluation: resolves a field mask into a state.
//!
//! The walk is a depth-first pre-order over the program tree:
//!
//! - a `Condition` compares `mask[field]` with its expected value (negated
//!   if requested); on a hit it descends into its children, otherwise (or if
//!   no child produced a state) evaluation moves on to the next sibling;
//! - a `Result` ends the walk with its state, first match wins;
//! - a `Reference` evaluates another program from the library against the
//!   same mask and returns its state if it produced one.
//!
//! Reference chains deeper than the evaluator's bound yield no result.

use std::collections::{BTreeMap, HashMap};

use gatefield_core::id::{FieldId, StateId};
use gatefield_core::step::StepKind;

use crate::program::{ProgramLibrary, StepProgram};

/// Field values visible to the evaluator.
///
/// Fields the mask does not know read as 0.
pub trait FieldMask {
    fn value(&self, field: FieldId) -> i32;
}

impl FieldMask for HashMap<FieldId, i32> {
    fn value(&self, field: FieldId) -> i32 {
        self.get(&field).copied().unwrap_or(0)
    }
}

impl FieldMask for BTreeMap<FieldId, i32> {
    fn value(&self, field: FieldId) -> i32 {
        self.get(&field).copied().unwrap_or(0)
    }
}

/// Evaluates step programs against a shared program library.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    library: &'a ProgramLibrary,
    max_depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(library: &'a ProgramLibrary, max_depth: usize) -> Self {
        Evaluator { library, max_depth }
    }

    /// Returns the first state reached, or `None` if the walk fell off the
    /// end of the program.
    pub fn evaluate(&self, program: &StepProgram, mask: &dyn FieldMask) -> Option<StateId> {
        self.walk(program, program.roots(), mask, 0)
    }

    fn walk(
        &self,
        program: &StepProgram,
        siblings: &[usize],
        mask: &dyn FieldMask,
        depth: usize,
    ) -> Option<StateId> {
        for index in siblings {
            let Some(node) = program.node(*index) else {
                continue;
            };
            match node.step.kind {
                StepKind::Condition {
                    field,
                    expected,
                    negate,
                } => {
                    let hit = (mask.value(field) == expected) != negate;
                    if hit {
                        if let Some(state) = self.walk(program, &node.children, mask, depth) {
                            return Some(state);
                        }
                    }
                }
                StepKind::Result { state } => return Some(state),
                StepKind::Reference { program: target } => {
                    if depth >= self.max_depth {
                        continue;
                    }
                    let Some(referenced) = self.library.get(target) else {
                        continue;
                    };
                    let found =
                        self.walk(referenced, referenced.roots(), mask, depth + 1);
                    if found.is_some() {
                        return found;
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatefield_core::id::ProgramId;
    use gatefield_core::step::Step;

    const F1: FieldId = FieldId(0);
    const F2: FieldId = FieldId(1);
    const A: StateId = StateId(0);
    const B: StateId = StateId(1);
    const C: StateId = StateId(2);

    fn mask(values: &[(FieldId, i32)]) -> HashMap<FieldId, i32> {
        values.iter().copied().collect()
    }

    #[test]
    fn first_matching_result_wins() {
        let program = StepProgram::build(
            "p",
            vec![
                Step::condition(1, None, F1, 1),
                Step::result(2, Some(1), A),
                Step::result(3, None, B),
            ],
            Some(B),
        );
        let library = ProgramLibrary::new();
        let eval = Evaluator::new(&library, 8);
        assert_eq!(eval.evaluate(&program, &mask(&[(F1, 1)])), Some(A));
        assert_eq!(eval.evaluate(&program, &mask(&[(F1, 0)])), Some(B));
        assert_eq!(eval.evaluate(&program, &mask(&[])), Some(B));
    }

    #[test]
    fn failed_subtree_falls_through_to_sibling() {
        // cond(F1==1) { cond(F2==1) { A } } ; C
        let program = StepProgram::build(
            "p",
            vec![
                Step::condition(1, None, F1, 1),
                Step::condition(2, Some(1), F2, 1),
                Step::result(3, Some(2), A),
                Step::result(4, None, C),
            ],
            None,
        );
        let library = ProgramLibrary::new();
        let eval = Evaluator::new(&library, 8);
        assert_eq!(eval.evaluate(&program, &mask(&[(F1, 1), (F2, 1)])), Some(A));
        assert_eq!(eval.evaluate(&program, &mask(&[(F1, 1), (F2, 0)])), Some(C));
    }

    #[test]
    fn negated_condition() {
        let program = StepProgram::build(
            "p",
            vec![Step::negated(1, None, F1, 1), Step::result(2, Some(1), A)],
            Some(B),
        );
        let library = ProgramLibrary::new();
        let eval = Evaluator::new(&library, 8);
        assert_eq!(eval.evaluate(&program, &mask(&[(F1, 0)])), Some(A));
        assert_eq!(eval.evaluate(&program, &mask(&[(F1, 1)])), Some(B));
    }

    #[test]
    fn reference_returns_or_falls_through() {
        let mut library = ProgramLibrary::new();
        library.insert(
            ProgramId(0),
            StepProgram::build(
                "hover",
                vec![Step::condition(1, None, F1, 1), Step::result(2, Some(1), A)],
                None,
            ),
        );
        let program = StepProgram::build(
            "p",
            vec![Step::reference(1, None, ProgramId(0)), Step::result(2, None, B)],
            Some(B),
        );
        let eval = Evaluator::new(&library, 8);
        assert_eq!(eval.evaluate(&program, &mask(&[(F1, 1)])), Some(A));
        assert_eq!(eval.evaluate(&program, &mask(&[])), Some(B));
    }

    #[test]
    fn self_reference_is_cut_off_by_depth() {
        let mut library = ProgramLibrary::new();
        library.insert(
            ProgramId(0),
            StepProgram::build("loop", vec![Step::reference(1, None, ProgramId(0))], None),
        );
        let program = StepProgram::build(
            "p",
            vec![Step::reference(1, None, ProgramId(0))],
            Some(C),
        );
        let eval = Evaluator::new(&library, 4);
        assert_eq!(eval.evaluate(&program, &mask(&[])), Some(C));
    }

    #[test]
    fn missing_reference_yields_nothing() {
        let library = ProgramLibrary::new();
        let program = StepProgram::build("p", vec![Step::reference(1, None, ProgramId(9))], None);
        let eval = Evaluator::new(&library, 4);
        assert_eq!(eval.evaluate(&program, &mask(&[])), None);
    }
}
