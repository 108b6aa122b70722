//! Scenario files: a blueprint plus a scripted sequence of inputs.
//!
//! Script entries run before the tick they name (ticks count from 1).

use std::collections::BTreeMap;

use gatefield_state::{Blueprint, NodeSpec, Session, SessionConfig, SessionError};
use serde::{Deserialize, Serialize};

fn default_ticks() -> u64 {
    10
}

fn default_dt() -> f64 {
    1.0 / 60.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: SessionConfig,
    pub blueprint: Blueprint,
    #[serde(default = "default_ticks")]
    pub ticks: u64,
    /// Seconds per tick.
    #[serde(default = "default_dt")]
    pub dt: f64,
    #[serde(default)]
    pub script: Vec<ScriptEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptEntry {
    pub tick: u64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Set { node: String, field: String, value: i32 },
    Override { node: String, field: String, value: i32 },
    ClearOverride { node: String, field: String },
    ForceState { node: String, state: String },
    ReleaseState { node: String },
    Spawn { spec: NodeSpec },
    Despawn { node: String },
}

impl Action {
    fn apply(&self, session: &mut Session) -> Result<(), SessionError> {
        match self {
            Action::Set { node, field, value } => session.set_input(node, field, *value),
            Action::Override { node, field, value } => {
                session.set_field_override(node, field, *value)
            }
            Action::ClearOverride { node, field } => session.clear_field_override(node, field),
            Action::ForceState { node, state } => session.force_state(node, state),
            Action::ReleaseState { node } => session.release_state(node),
            Action::Spawn { spec } => session.spawn(spec).map(|_| ()),
            Action::Despawn { node } => session.despawn(node).map(|_| ()),
        }
    }
}

/// One committed state change, by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeLine {
    pub tick: u64,
    pub node: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub changes: Vec<ChangeLine>,
    /// Active state of every node after the last tick.
    pub states: BTreeMap<String, String>,
    /// Ticks on which the sort found dependency cycles.
    pub cycle_ticks: Vec<u64>,
    /// Ticks on which the sort ran out of budget.
    pub deferred_ticks: Vec<u64>,
}

/// Loads the scenario and plays its script.
///
/// A failing script action is logged and skipped; a failing tick (strict
/// cycle mode) ends the run with an error.
pub fn run(scenario: &Scenario) -> Result<RunSummary, SessionError> {
    let mut session = Session::from_blueprint(scenario.config, &scenario.blueprint)?;
    let mut summary = RunSummary {
        ticks: scenario.ticks,
        changes: Vec::new(),
        states: BTreeMap::new(),
        cycle_ticks: Vec::new(),
        deferred_ticks: Vec::new(),
    };

    for tick in 1..=scenario.ticks {
        for entry in scenario.script.iter().filter(|e| e.tick == tick) {
            if let Err(err) = entry.action.apply(&mut session) {
                tracing::warn!("tick {}: script action {:?} failed: {}", tick, entry.action, err);
            }
        }

        let report = session.tick(scenario.dt)?;
        if !report.refresh.stable {
            summary.deferred_ticks.push(tick);
        }
        if !report.refresh.cycles.is_empty() {
            summary.cycle_ticks.push(tick);
        }
        for change in &report.state_changes {
            let line = ChangeLine {
                tick,
                node: session.node_name(change.owner).unwrap_or("?").to_string(),
                from: session.state_name(change.old).unwrap_or("?").to_string(),
                to: session.state_name(change.new).unwrap_or("?").to_string(),
            };
            tracing::info!("tick {}: {} {} -> {}", tick, line.node, line.from, line.to);
            summary.changes.push(line);
        }
    }

    for (_, node) in session.nodes() {
        let state = session.state_of(node.name()).unwrap_or("?").to_string();
        summary.states.insert(node.name().to_string(), state);
    }
    Ok(summary)
}

/// Problems found in one node while loading.
#[derive(Debug, Clone, Serialize)]
pub struct NodeCheck {
    pub name: String,
    /// State the node starts in.
    pub initial: String,
    pub disabled: bool,
    pub repairs: Vec<String>,
    pub dropped_gates: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub nodes: Vec<NodeCheck>,
    /// Groups of shared programs referencing each other.
    pub program_cycles: Vec<Vec<String>>,
    /// Dependency cycles as `dependent -> field` descriptions.
    pub field_cycles: Vec<String>,
    pub fields: usize,
    pub islands: usize,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.program_cycles.is_empty()
            && self.field_cycles.is_empty()
            && self.nodes.iter().all(|node| {
                !node.disabled && node.repairs.is_empty() && node.dropped_gates.is_empty()
            })
    }
}

/// Loads a blueprint and sorts its graph without running any node.
pub fn check(config: SessionConfig, blueprint: &Blueprint) -> Result<CheckReport, SessionError> {
    let mut session = Session::from_blueprint(config, blueprint)?;

    // Cycle errors are reported below, not raised.
    let mut graph_config = *session.graph().config();
    graph_config.strict_cycles = false;
    session.graph_mut().set_config(graph_config);
    let mut stable = false;
    for _ in 0..1024 {
        if session.graph_mut().refresh()?.stable {
            stable = true;
            break;
        }
    }
    if !stable {
        tracing::warn!("graph did not finish sorting; cycle report may be incomplete");
    }

    let nodes = session
        .nodes()
        .map(|(_, node)| NodeCheck {
            name: node.name().to_string(),
            initial: session.state_name(node.machine().active()).unwrap_or("?").to_string(),
            disabled: node.machine().is_disabled(),
            repairs: node.repairs().iter().map(ToString::to_string).collect(),
            dropped_gates: node.dropped_gates().to_vec(),
        })
        .collect();
    let program_cycles = session
        .library()
        .reference_cycles()
        .into_iter()
        .map(|cycle| {
            cycle
                .into_iter()
                .map(|id| session.registry().program_name(id).unwrap_or("?").to_string())
                .collect()
        })
        .collect();
    let field_cycles = session
        .graph()
        .last_cycles()
        .iter()
        .map(|cycle| format!("field {} reads field {}", cycle.dependent, cycle.field))
        .collect();
    let fields = session.graph().field_count();
    let islands = session.graph_mut().island_count();

    Ok(CheckReport {
        nodes,
        program_cycles,
        field_cycles,
        fields,
        islands,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOVER: &str = r#"{
        "ticks": 4,
        "dt": 0.1,
        "blueprint": {
            "fields": [
                { "name": "Hovered", "kind": "bool" },
                { "name": "Pointer", "kind": "bool" }
            ],
            "states": ["Idle", "Hover"],
            "nodes": [{
                "name": "button",
                "initial": "Idle",
                "gates": [{ "target": "Hovered", "source": { "type": "input", "field": "Pointer" } }],
                "steps": [
                    { "id": 1, "kind": "condition", "field": "Hovered" },
                    { "id": 2, "parent": 1, "kind": "result", "state": "Hover" },
                    { "id": 3, "kind": "result", "state": "Idle" }
                ]
            }]
        },
        "script": [
            { "tick": 2, "action": "set", "node": "button", "field": "Pointer", "value": 1 },
            { "tick": 4, "action": "set", "node": "button", "field": "Pointer", "value": 0 },
            { "tick": 4, "action": "set", "node": "ghost", "field": "Pointer", "value": 0 }
        ]
    }"#;

    #[test]
    fn runs_script() {
        let scenario: Scenario = serde_json::from_str(HOVER).unwrap();
        let summary = run(&scenario).unwrap();
        assert_eq!(
            summary.changes,
            vec![
                ChangeLine {
                    tick: 2,
                    node: "button".into(),
                    from: "Idle".into(),
                    to: "Hover".into()
                },
                ChangeLine {
                    tick: 4,
                    node: "button".into(),
                    from: "Hover".into(),
                    to: "Idle".into()
                },
            ]
        );
        assert_eq!(summary.states["button"], "Idle");
        assert!(summary.cycle_ticks.is_empty());
    }

    #[test]
    fn check_reports_clean_blueprint() {
        let scenario: Scenario = serde_json::from_str(HOVER).unwrap();
        let report = check(scenario.config, &scenario.blueprint).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.fields, 2);
        assert_eq!(report.islands, 1);
    }

    #[test]
    fn check_flags_disabled_node() {
        let blueprint: Blueprint =
            serde_json::from_str(r#"{ "states": ["Idle"], "nodes": [{ "name": "inert" }] }"#).unwrap();
        let report = check(SessionConfig::default(), &blueprint).unwrap();
        assert!(!report.is_clean());
        assert!(report.nodes[0].disabled);
        assert_eq!(report.nodes[0].initial, "Idle");
    }
}
