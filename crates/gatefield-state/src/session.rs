//! `Session`: owns the registry, the field graph, the program library and
//! every node, and drives them one tick at a time.
//!
//! # Tick
//!
//! 1. Refresh the graph (edges, a budgeted sort slice, values).
//! 2. Drain value changes; every node owning a changed field becomes
//!    state-dirty.
//! 3. Tick every node's state machine and collect committed state changes.
//!    While the sort is still mid-pass no field value is read: nodes only
//!    run their countdowns and evaluate on the first stable tick.
//!
//! All structural mutation (spawning, despawning, input writes, overrides)
//! happens between ticks through `&mut self`, so nothing observes a
//! half-refreshed graph.
//!
//! # Building nodes
//!
//! A node's gates are wired one at a time. A gate whose target or source
//! cannot be resolved is dropped with a warning, and any helper field
//! created while wiring it is removed again; the node keeps its other
//! gates. A node without any steps or program cannot produce a state and is
//! disabled.

use std::collections::{BTreeMap, HashMap, HashSet};

use gatefield_core::id::{FieldHandle, FieldId, OwnerId, ProgramId, StateId, StepId};
use gatefield_core::error::CoreError;
use gatefield_core::registry::Registry;
use gatefield_core::step::{Step, StepKind};
use gatefield_core::value::{ValueKind, EMPTY};
use gatefield_graph::{FieldGraph, RefreshReport, ValueChange};
use indexmap::IndexMap;
use serde::Serialize;

use crate::blueprint::{Blueprint, GateSpec, NodeSpec, OwnerRef, ProgramSpec, SourceSpec, StepSpec, StepSpecKind};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::eval::{Evaluator, FieldMask};
use crate::machine::{StateChange, StateMachine};
use crate::program::fixup::StepIds;
use crate::program::{ProgramLibrary, Repair, StepProgram};

/// A live node.
#[derive(Debug, Clone)]
pub struct NodeEntry {
    name: String,
    machine: StateMachine,
    /// Warnings for gates that could not be wired.
    dropped_gates: Vec<String>,
}

impl NodeEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn dropped_gates(&self) -> &[String] {
        &self.dropped_gates
    }

    /// Repairs made to the node's step program.
    pub fn repairs(&self) -> &[Repair] {
        self.machine.program().repairs()
    }
}

/// What one [`Session::tick`] did.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub refresh: RefreshReport,
    pub value_changes: Vec<ValueChange>,
    pub state_changes: Vec<StateChange>,
}

/// Field values of one node, as seen by its step program: its outputs,
/// then its inputs. Unknown and not-yet-computed fields read as 0.
struct NodeMask<'a> {
    graph: &'a FieldGraph,
    inputs: &'a HashMap<(OwnerId, FieldId), FieldHandle>,
    owner: OwnerId,
}

impl FieldMask for NodeMask<'_> {
    fn value(&self, field: FieldId) -> i32 {
        self.graph
            .find_output(self.owner, field)
            .or_else(|| self.inputs.get(&(self.owner, field)).copied())
            .and_then(|handle| self.graph.value(handle))
            .filter(|value| *value != EMPTY)
            .unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    registry: Registry,
    graph: FieldGraph,
    library: ProgramLibrary,
    nodes: IndexMap<OwnerId, NodeEntry>,
    names: HashMap<String, OwnerId>,
    inputs: HashMap<(OwnerId, FieldId), FieldHandle>,
    next_owner: u32,
    tick: u64,
    /// Committed state changes not yet drained.
    state_changes: Vec<StateChange>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Session {
            config,
            registry: Registry::new(),
            graph: FieldGraph::new(config.graph),
            library: ProgramLibrary::new(),
            nodes: IndexMap::new(),
            names: HashMap::new(),
            inputs: HashMap::new(),
            next_owner: 0,
            tick: 0,
            state_changes: Vec::new(),
        }
    }

    pub fn from_blueprint(config: SessionConfig, blueprint: &Blueprint) -> Result<Self, SessionError> {
        let mut session = Self::new(config);
        session.load(blueprint)?;
        Ok(session)
    }

    /// Tears down every node and field and starts a new registration epoch.
    pub fn reset(&mut self) {
        self.registry.reset();
        self.graph = FieldGraph::new(self.config.graph);
        self.library = ProgramLibrary::new();
        self.nodes.clear();
        self.names.clear();
        self.inputs.clear();
        self.next_owner = 0;
        self.tick = 0;
        self.state_changes.clear();
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Adds everything in `blueprint` to the session. Returns the owners of
    /// the new nodes in blueprint order.
    ///
    /// Field kind conflicts, duplicate node names and unknown parents are
    /// errors and leave the node set untouched. Problems inside a node are
    /// repaired and logged.
    pub fn load(&mut self, blueprint: &Blueprint) -> Result<Vec<OwnerId>, SessionError> {
        let mut pending: HashSet<&str> = HashSet::new();
        for spec in &blueprint.nodes {
            if self.names.contains_key(&spec.name) || !pending.insert(&spec.name) {
                return Err(SessionError::DuplicateNode {
                    name: spec.name.clone(),
                });
            }
        }
        for spec in &blueprint.nodes {
            if let Some(parent) = &spec.parent {
                if !self.names.contains_key(parent) && !pending.contains(parent.as_str()) {
                    return Err(SessionError::UnknownNode {
                        name: parent.clone(),
                    });
                }
            }
        }

        for field in &blueprint.fields {
            self.registry.register_field(&field.name, field.kind)?;
        }
        for state in &blueprint.states {
            self.registry.intern_state(state);
        }
        for program in &blueprint.programs {
            self.add_program(program);
        }
        self.check_library();

        let owners: Vec<OwnerId> = blueprint
            .nodes
            .iter()
            .map(|spec| self.declare_node(&spec.name))
            .collect();
        for (spec, owner) in blueprint.nodes.iter().zip(&owners) {
            if let Some(parent) = &spec.parent {
                let Some(parent_owner) = self.names.get(parent).copied() else {
                    continue;
                };
                if let Err(err) = self.graph.set_parent(*owner, parent_owner) {
                    tracing::warn!("node '{}': parent '{}' ignored: {}", spec.name, parent, err);
                }
            }
        }
        for (spec, owner) in blueprint.nodes.iter().zip(&owners) {
            self.build_node(*owner, spec);
        }
        Ok(owners)
    }

    /// Adds a single node. Its parent, if any, must already exist.
    pub fn spawn(&mut self, spec: &NodeSpec) -> Result<OwnerId, SessionError> {
        if self.names.contains_key(&spec.name) {
            return Err(SessionError::DuplicateNode {
                name: spec.name.clone(),
            });
        }
        let parent = match &spec.parent {
            Some(parent) => Some(self.owner_id(parent)?),
            None => None,
        };
        let owner = self.declare_node(&spec.name);
        if let Some(parent) = parent {
            self.graph.set_parent(owner, parent)?;
        }
        self.build_node(owner, spec);
        Ok(owner)
    }

    /// Removes a node and all of its fields. Gates elsewhere that read them
    /// are pruned on the next tick. Returns the number of fields removed.
    pub fn despawn(&mut self, name: &str) -> Result<usize, SessionError> {
        let owner = self.owner_id(name)?;
        let removed = self.graph.remove_owner(owner);
        self.nodes.shift_remove(&owner);
        self.names.remove(name);
        self.inputs.retain(|(input_owner, _), _| *input_owner != owner);
        tracing::debug!("despawned node '{}' ({} fields)", name, removed);
        Ok(removed)
    }

    /// Registers a shared program, replacing any program of the same name.
    pub fn add_program(&mut self, spec: &ProgramSpec) -> ProgramId {
        let id = self.registry.intern_program(&spec.name);
        let (steps, repairs) = self.resolve_steps(&spec.name, &spec.steps);
        let mut program = StepProgram::build(&spec.name, steps, None);
        for repair in repairs {
            program.push_repair(repair);
        }
        self.library.insert(id, program);
        id
    }

    /// Logs references to missing programs and reference loops.
    fn check_library(&self) {
        for (_, program) in self.library.iter() {
            for repair in self.library.missing_references(program) {
                tracing::warn!("program '{}': {}", program.name(), repair);
            }
        }
        for cycle in self.library.reference_cycles() {
            let names: Vec<&str> = cycle
                .iter()
                .filter_map(|id| self.registry.program_name(*id))
                .collect();
            tracing::warn!(
                "programs {:?} reference each other; evaluation stops at depth {}",
                names,
                self.config.max_reference_depth
            );
        }
    }

    fn declare_node(&mut self, name: &str) -> OwnerId {
        let owner = OwnerId(self.next_owner);
        self.next_owner += 1;
        self.names.insert(name.to_string(), owner);
        owner
    }

    /// Interns the names used by `specs`. Conditions on unknown fields are
    /// left out; their children then fail fix-up as orphans.
    fn resolve_steps(&mut self, program: &str, specs: &[StepSpec]) -> (Vec<Step>, Vec<Repair>) {
        let mut steps = Vec::with_capacity(specs.len());
        let mut repairs = Vec::new();
        for spec in specs {
            let kind = match &spec.kind {
                StepSpecKind::Condition {
                    field,
                    equals,
                    negate,
                } => match self.registry.field_id(field) {
                    Some(field) => StepKind::Condition {
                        field,
                        expected: *equals,
                        negate: *negate,
                    },
                    None => {
                        let repair = Repair::UnknownField {
                            step: StepId(spec.id),
                            field: field.clone(),
                        };
                        tracing::warn!("program '{}': {}", program, repair);
                        repairs.push(repair);
                        continue;
                    }
                },
                StepSpecKind::Result { state } => StepKind::Result {
                    state: self.registry.intern_state(state),
                },
                StepSpecKind::Reference { program } => StepKind::Reference {
                    program: self.registry.intern_program(program),
                },
            };
            steps.push(Step {
                id: StepId(spec.id),
                parent: spec.parent.map(StepId),
                kind,
            });
        }
        (steps, repairs)
    }

    fn build_node(&mut self, owner: OwnerId, spec: &NodeSpec) {
        let mut dropped_gates = Vec::new();
        for gate in &spec.gates {
            if let Err(err) = self.wire_gate(owner, gate) {
                let message = format!("gate into '{}' dropped: {}", gate.target, err);
                tracing::warn!("node '{}': {}", spec.name, message);
                dropped_gates.push(message);
            }
        }

        let has_program = !spec.steps.is_empty() || spec.program.is_some();
        let (mut steps, repairs) = self.resolve_steps(&spec.name, &spec.steps);
        if let Some(shared) = &spec.program {
            let program = self.registry.intern_program(shared);
            let id = StepIds::new(&steps).fresh();
            steps.insert(0, Step::reference(id.0, None, program));
        }

        let initial = self.initial_state(spec, &steps);
        let machine = if has_program {
            let mut program = StepProgram::build(&spec.name, steps, Some(initial));
            for repair in repairs {
                program.push_repair(repair);
            }
            for repair in self.library.missing_references(&program) {
                tracing::warn!("node '{}': {}", spec.name, repair);
                program.push_repair(repair);
            }
            self.check_declared_fields(owner, &spec.name, &program);
            StateMachine::new(program, initial).with_delays(
                self.delay_table(&spec.exit_delays),
                self.delay_table(&spec.enter_delays),
            )
        } else {
            tracing::error!("node '{}' has no step program and is disabled", spec.name);
            StateMachine::disabled(&spec.name, initial)
        };

        self.nodes.insert(
            owner,
            NodeEntry {
                name: spec.name.clone(),
                machine,
                dropped_gates,
            },
        );
    }

    /// The node's initial state: as given, else the first root result of
    /// its own steps or shared program, else the first known state, else a
    /// fresh `"default"` state.
    fn initial_state(&mut self, spec: &NodeSpec, steps: &[Step]) -> StateId {
        if let Some(name) = &spec.initial {
            return self.registry.intern_state(name);
        }
        let from_steps = steps.iter().find_map(|step| match step.kind {
            StepKind::Result { state } if step.parent.is_none() => Some(state),
            _ => None,
        });
        let from_shared = || {
            spec.program
                .as_deref()
                .and_then(|name| self.registry.program_id(name))
                .and_then(|id| self.library.get(id))
                .and_then(StepProgram::first_root_result)
        };
        let state = match from_steps.or_else(from_shared) {
            Some(state) => state,
            None if self.registry.state_count() > 0 => StateId(0),
            None => self.registry.intern_state("default"),
        };
        tracing::warn!(
            "node '{}' has no initial state; starting in '{}'",
            spec.name,
            self.registry.state_name(state).unwrap_or("?")
        );
        state
    }

    fn delay_table(&mut self, delays: &BTreeMap<String, f64>) -> HashMap<StateId, f64> {
        delays
            .iter()
            .map(|(state, seconds)| (self.registry.intern_state(state), *seconds))
            .collect()
    }

    /// Warns about conditions on fields the node has neither as output nor
    /// as input. Such conditions always see 0.
    fn check_declared_fields(&self, owner: OwnerId, name: &str, program: &StepProgram) {
        let mut reported = HashSet::new();
        for field in program.condition_fields() {
            let declared = self.graph.find_output(owner, field).is_some()
                || self.inputs.contains_key(&(owner, field));
            if !declared && reported.insert(field) {
                tracing::warn!(
                    "node '{}' reads field '{}' which it does not declare; it reads as 0",
                    name,
                    self.registry.field(field).map_or("?", |def| def.name.as_str())
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Gate wiring
    // -----------------------------------------------------------------------

    fn wire_gate(&mut self, owner: OwnerId, gate: &GateSpec) -> Result<FieldHandle, SessionError> {
        let mut created = Vec::new();
        let result = self.try_wire_gate(owner, gate, &mut created);
        if result.is_err() {
            for field in created.into_iter().rev() {
                if self.graph.remove_field(field).is_err() {
                    tracing::debug!("field {} already gone while unwinding gate", field);
                }
            }
            let graph = &self.graph;
            self.inputs.retain(|_, handle| graph.is_live(*handle));
        }
        result
    }

    fn try_wire_gate(
        &mut self,
        owner: OwnerId,
        gate: &GateSpec,
        created: &mut Vec<FieldHandle>,
    ) -> Result<FieldHandle, SessionError> {
        let (target, kind) = self.registry.resolve_field(&gate.target)?;
        let source = self.build_source(owner, &gate.source, kind, created)?;
        Ok(self.graph.add_gate(owner, target, kind, gate.policy, source)?)
    }

    /// Creates (or finds) the field a source spec describes. `kind` is the
    /// value kind expected by whatever reads the source.
    fn build_source(
        &mut self,
        owner: OwnerId,
        spec: &SourceSpec,
        kind: ValueKind,
        created: &mut Vec<FieldHandle>,
    ) -> Result<FieldHandle, SessionError> {
        let field = match spec {
            SourceSpec::Input { field, value } => {
                let (def, kind) = self.registry.resolve_field(field)?;
                if let Some(existing) = self.inputs.get(&(owner, def)) {
                    return Ok(*existing);
                }
                let handle = self.graph.add_input(owner, Some(def), kind, *value);
                self.inputs.insert((owner, def), handle);
                handle
            }
            SourceSpec::Constant { value } => self.graph.add_constant(owner, kind, *value),
            SourceSpec::Field { field, of } => {
                let (def, kind) = self.registry.resolve_field(field)?;
                let source_owner = self.resolve_owner(owner, of)?;
                if let Some(existing) = self.graph.find_output(source_owner, def) {
                    return Ok(existing);
                }
                self.graph.output_field(source_owner, def, kind)?
            }
            SourceSpec::Not { of } => {
                let inner = self.build_source(owner, of, ValueKind::Bool, created)?;
                self.graph.add_not(owner, inner)?
            }
            SourceSpec::Equals { of, value } => {
                let inner = self.build_source(owner, of, kind, created)?;
                self.graph.add_equals(owner, inner, *value)?
            }
            SourceSpec::AnyOf { members } | SourceSpec::AllOf { members } => {
                let mut handles = Vec::with_capacity(members.len());
                for member in members {
                    handles.push(self.build_source(owner, member, ValueKind::Bool, created)?);
                }
                if matches!(spec, SourceSpec::AnyOf { .. }) {
                    self.graph.add_any_of(owner, &handles)?
                } else {
                    self.graph.add_all_of(owner, &handles)?
                }
            }
            SourceSpec::AnyChild { field } => {
                let (def, _) = self.registry.resolve_field(field)?;
                self.graph.add_any_child(owner, def)
            }
            SourceSpec::Proxy { of } => {
                let inner = self.build_source(owner, of, kind, created)?;
                self.graph.add_proxy(owner, inner)?
            }
        };
        created.push(field);
        Ok(field)
    }

    fn resolve_owner(&self, owner: OwnerId, of: &OwnerRef) -> Result<OwnerId, SessionError> {
        match of {
            OwnerRef::SelfNode => Ok(owner),
            OwnerRef::Parent => self.graph.parent_of(owner).ok_or_else(|| SessionError::NoParent {
                node: self.owner_name(owner).to_string(),
            }),
            OwnerRef::Node(name) => self.owner_id(name),
        }
    }

    // -----------------------------------------------------------------------
    // Driving
    // -----------------------------------------------------------------------

    /// Advances the session by one tick of `dt` seconds.
    pub fn tick(&mut self, dt: f64) -> Result<TickReport, SessionError> {
        self.tick += 1;
        let refresh = self.graph.refresh()?;
        let value_changes = self.graph.take_changes();
        for change in &value_changes {
            if let Some(node) = self.nodes.get_mut(&change.owner) {
                node.machine.mark_dirty();
            }
        }

        let evaluator = Evaluator::new(&self.library, self.config.max_reference_depth);
        let mut state_changes = Vec::new();
        for (owner, node) in self.nodes.iter_mut() {
            let mask = NodeMask {
                graph: &self.graph,
                inputs: &self.inputs,
                owner: *owner,
            };
            let committed = if refresh.stable {
                node.machine.tick(dt, &mask, &evaluator)
            } else {
                node.machine.advance(dt)
            };
            if let Some((old, new)) = committed {
                tracing::debug!(
                    "node '{}' changed state {} -> {} on tick {}",
                    node.name,
                    self.registry.state_name(old).unwrap_or("?"),
                    self.registry.state_name(new).unwrap_or("?"),
                    self.tick
                );
                state_changes.push(StateChange {
                    owner: *owner,
                    old,
                    new,
                    at_tick: self.tick,
                });
            }
        }
        self.state_changes.extend_from_slice(&state_changes);

        Ok(TickReport {
            tick: self.tick,
            refresh,
            value_changes,
            state_changes,
        })
    }

    /// Drains committed state changes, oldest first.
    pub fn take_state_changes(&mut self) -> Vec<StateChange> {
        std::mem::take(&mut self.state_changes)
    }

    pub fn set_input(&mut self, node: &str, field: &str, value: i32) -> Result<(), SessionError> {
        let handle = self.input_handle(node, field)?;
        Ok(self.graph.set_input(handle, value)?)
    }

    /// Overrides output `field` of `node`. Takes effect immediately.
    pub fn set_field_override(&mut self, node: &str, field: &str, value: i32) -> Result<(), SessionError> {
        let handle = self.output_handle(node, field)?;
        Ok(self.graph.set_override(handle, value)?)
    }

    pub fn clear_field_override(&mut self, node: &str, field: &str) -> Result<(), SessionError> {
        let handle = self.output_handle(node, field)?;
        Ok(self.graph.clear_override(handle)?)
    }

    /// Pins `node` to `state` regardless of its program.
    pub fn force_state(&mut self, node: &str, state: &str) -> Result<(), SessionError> {
        let state = self
            .registry
            .state_id(state)
            .ok_or_else(|| CoreError::UnknownState {
                name: state.to_string(),
            })?;
        self.live_machine(node)?.set_override(Some(state));
        Ok(())
    }

    pub fn release_state(&mut self, node: &str) -> Result<(), SessionError> {
        self.live_machine(node)?.set_override(None);
        Ok(())
    }

    fn live_machine(&mut self, node: &str) -> Result<&mut StateMachine, SessionError> {
        let owner = self.owner_id(node)?;
        let entry = self
            .nodes
            .get_mut(&owner)
            .ok_or_else(|| SessionError::UnknownNode {
                name: node.to_string(),
            })?;
        if entry.machine.is_disabled() {
            return Err(SessionError::NodeDisabled {
                name: node.to_string(),
            });
        }
        Ok(&mut entry.machine)
    }

    fn input_handle(&self, node: &str, field: &str) -> Result<FieldHandle, SessionError> {
        let owner = self.owner_id(node)?;
        self.registry
            .field_id(field)
            .and_then(|def| self.inputs.get(&(owner, def)).copied())
            .ok_or_else(|| SessionError::UnknownInput {
                node: node.to_string(),
                field: field.to_string(),
            })
    }

    fn output_handle(&self, node: &str, field: &str) -> Result<FieldHandle, SessionError> {
        let owner = self.owner_id(node)?;
        self.registry
            .field_id(field)
            .and_then(|def| self.graph.find_output(owner, def))
            .ok_or_else(|| SessionError::UnknownOutput {
                node: node.to_string(),
                field: field.to_string(),
            })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn owner_id(&self, name: &str) -> Result<OwnerId, SessionError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| SessionError::UnknownNode {
                name: name.to_string(),
            })
    }

    fn owner_name(&self, owner: OwnerId) -> &str {
        self.names
            .iter()
            .find(|(_, id)| **id == owner)
            .map_or("?", |(name, _)| name.as_str())
    }

    pub fn node(&self, name: &str) -> Option<&NodeEntry> {
        self.names.get(name).and_then(|owner| self.nodes.get(owner))
    }

    /// Nodes in spawn order.
    pub fn nodes(&self) -> impl Iterator<Item = (OwnerId, &NodeEntry)> {
        self.nodes.iter().map(|(owner, entry)| (*owner, entry))
    }

    /// Name of the active state of `node`.
    pub fn state_of(&self, node: &str) -> Option<&str> {
        let entry = self.node(node)?;
        self.registry.state_name(entry.machine.active())
    }

    pub fn state_name(&self, state: StateId) -> Option<&str> {
        self.registry.state_name(state)
    }

    pub fn node_name(&self, owner: OwnerId) -> Option<&str> {
        self.nodes.get(&owner).map(|entry| entry.name.as_str())
    }

    pub fn output_value(&self, node: &str, field: &str) -> Option<i32> {
        let handle = self.output_handle(node, field).ok()?;
        self.graph.value(handle)
    }

    pub fn input_value(&self, node: &str, field: &str) -> Option<i32> {
        let handle = self.input_handle(node, field).ok()?;
        self.graph.value(handle)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn graph(&self) -> &FieldGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut FieldGraph {
        &mut self.graph
    }

    pub fn library(&self) -> &ProgramLibrary {
        &self.library
    }

    /// Ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }
}
