//! Node state machine.
//!
//! Each node holds an active state and at most one pending transition:
//! `Settled -> Pending { target, remaining } -> Settled`. On a tick where the
//! node is state-dirty, the step program (or an explicit state override)
//! picks a candidate. A candidate different from the current target arms a
//! countdown of `max(exit[active], enter[candidate])` seconds; when the
//! countdown runs out the pending state becomes active.
//!
//! A candidate equal to the active state cancels any pending transition.

use std::collections::HashMap;

use gatefield_core::id::{OwnerId, StateId};
use serde::Serialize;

use crate::eval::{Evaluator, FieldMask};
use crate::program::StepProgram;

/// Countdowns within this of zero count as expired.
const DELAY_EPSILON: f64 = 1e-9;

/// A committed state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub owner: OwnerId,
    pub old: StateId,
    pub new: StateId,
    /// Session tick on which the change was committed.
    pub at_tick: u64,
}

/// Transition progress of a [`StateMachine`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// No change in flight.
    Settled,
    /// Waiting for `remaining` seconds before `target` becomes active.
    Pending { target: StateId, remaining: f64 },
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    program: StepProgram,
    active: StateId,
    transition: Transition,
    time_since_change: f64,
    override_state: Option<StateId>,
    /// Set when an input of the program may have changed.
    state_dirty: bool,
    /// Nodes without any program never evaluate.
    disabled: bool,
    exit_delays: HashMap<StateId, f64>,
    enter_delays: HashMap<StateId, f64>,
}

impl StateMachine {
    /// A machine starting in `initial`. The first tick evaluates the program.
    pub fn new(program: StepProgram, initial: StateId) -> Self {
        StateMachine {
            program,
            active: initial,
            transition: Transition::Settled,
            time_since_change: 0.0,
            override_state: None,
            state_dirty: true,
            disabled: false,
            exit_delays: HashMap::new(),
            enter_delays: HashMap::new(),
        }
    }

    /// A machine that stays in `initial` forever.
    pub fn disabled(name: &str, initial: StateId) -> Self {
        let mut machine = Self::new(StepProgram::build(name, Vec::new(), None), initial);
        machine.disabled = true;
        machine.state_dirty = false;
        machine
    }

    pub fn with_delays(
        mut self,
        exit: HashMap<StateId, f64>,
        enter: HashMap<StateId, f64>,
    ) -> Self {
        self.exit_delays = exit;
        self.enter_delays = enter;
        self
    }

    pub fn active(&self) -> StateId {
        self.active
    }

    pub fn pending(&self) -> Option<StateId> {
        match self.transition {
            Transition::Settled => None,
            Transition::Pending { target, .. } => Some(target),
        }
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    pub fn time_since_change(&self) -> f64 {
        self.time_since_change
    }

    pub fn override_state(&self) -> Option<StateId> {
        self.override_state
    }

    pub fn program(&self) -> &StepProgram {
        &self.program
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn is_state_dirty(&self) -> bool {
        self.state_dirty
    }

    pub fn mark_dirty(&mut self) {
        if !self.disabled {
            self.state_dirty = true;
        }
    }

    /// Pins the evaluated state to `state`, or releases the pin with `None`.
    pub fn set_override(&mut self, state: Option<StateId>) {
        self.override_state = state;
        self.mark_dirty();
    }

    /// Delay before `to` may replace `from`.
    pub fn transition_delay(&self, from: StateId, to: StateId) -> f64 {
        let exit = self.exit_delays.get(&from).copied().unwrap_or(0.0);
        let enter = self.enter_delays.get(&to).copied().unwrap_or(0.0);
        exit.max(enter).max(0.0)
    }

    /// Advances the machine by `dt` seconds. Returns `(old, new)` when a
    /// transition commits.
    pub fn tick(
        &mut self,
        dt: f64,
        mask: &dyn FieldMask,
        evaluator: &Evaluator<'_>,
    ) -> Option<(StateId, StateId)> {
        if self.disabled {
            return None;
        }
        let armed_now = self.state_dirty && self.evaluate(mask, evaluator);
        self.count_down(dt, armed_now)
    }

    /// Advances timers and any pending countdown without evaluating the
    /// program. A pending re-evaluation stays queued for the next `tick`.
    pub fn advance(&mut self, dt: f64) -> Option<(StateId, StateId)> {
        if self.disabled {
            return None;
        }
        self.count_down(dt, false)
    }

    /// Picks a candidate and updates the transition. Returns true if a new
    /// countdown was armed.
    fn evaluate(&mut self, mask: &dyn FieldMask, evaluator: &Evaluator<'_>) -> bool {
        self.state_dirty = false;
        let candidate = match self.override_state {
            Some(state) => state,
            None => evaluator
                .evaluate(&self.program, mask)
                .unwrap_or(self.active),
        };
        let target = self.pending().unwrap_or(self.active);
        if candidate == target {
            return false;
        }
        if candidate == self.active {
            self.transition = Transition::Settled;
            return false;
        }
        self.transition = Transition::Pending {
            target: candidate,
            remaining: self.transition_delay(self.active, candidate),
        };
        true
    }

    fn count_down(&mut self, dt: f64, armed_now: bool) -> Option<(StateId, StateId)> {
        let dt = dt.max(0.0);
        self.time_since_change += dt;

        let Transition::Pending { target, remaining } = self.transition else {
            return None;
        };
        let remaining = if armed_now { remaining } else { remaining - dt };
        if remaining > DELAY_EPSILON {
            self.transition = Transition::Pending { target, remaining };
            return None;
        }
        let old = self.active;
        self.active = target;
        self.transition = Transition::Settled;
        self.time_since_change = 0.0;
        Some((old, target))
    }
}
