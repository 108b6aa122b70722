//! Name interning for field definitions, states and programs.
//!
//! The [`Registry`] turns names into dense integer ids in first-seen order.
//! One registry instance is threaded through construction of a session; its
//! ids are valid for the current registration epoch only. [`Registry::reset`]
//! starts a new epoch and invalidates every id handed out before.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::{FieldId, ProgramId, StateId};
use crate::value::ValueKind;

/// A registered field definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: ValueKind,
}

/// Registry of field definitions, state names and program names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    /// Field definitions indexed by FieldId.0
    fields: Vec<FieldDef>,
    field_names: HashMap<String, FieldId>,
    /// State names indexed by StateId.0
    states: Vec<String>,
    state_names: HashMap<String, StateId>,
    /// Program names indexed by ProgramId.0
    programs: Vec<String>,
    program_names: HashMap<String, ProgramId>,
    /// Incremented on every reset.
    epoch: u32,
}

impl Registry {
    /// Creates an empty registry at epoch 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a field definition, returning its [`FieldId`].
    ///
    /// Registering an existing name with the same kind returns the existing
    /// id. A different kind is a [`CoreError::FieldKindConflict`].
    pub fn register_field(&mut self, name: &str, kind: ValueKind) -> Result<FieldId, CoreError> {
        if let ValueKind::Enum { cardinality: 0 } = kind {
            return Err(CoreError::EmptyEnum {
                name: name.to_string(),
            });
        }
        if let Some(&id) = self.field_names.get(name) {
            let existing = self.fields[id.0 as usize].kind;
            if existing != kind {
                return Err(CoreError::FieldKindConflict {
                    name: name.to_string(),
                    existing,
                    requested: kind,
                });
            }
            return Ok(id);
        }
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(FieldDef {
            name: name.to_string(),
            kind,
        });
        self.field_names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Looks up a field definition by id.
    pub fn field(&self, id: FieldId) -> Option<&FieldDef> {
        self.fields.get(id.0 as usize)
    }

    /// Looks up a field id by name.
    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.field_names.get(name).copied()
    }

    /// Resolves a field name, failing with [`CoreError::UnknownField`].
    pub fn resolve_field(&self, name: &str) -> Result<(FieldId, ValueKind), CoreError> {
        let id = self.field_id(name).ok_or_else(|| CoreError::UnknownField {
            name: name.to_string(),
        })?;
        Ok((id, self.fields[id.0 as usize].kind))
    }

    /// Returns the value kind of a registered field.
    pub fn field_kind(&self, id: FieldId) -> Result<ValueKind, CoreError> {
        self.field(id)
            .map(|def| def.kind)
            .ok_or(CoreError::FieldNotFound { id })
    }

    /// Interns a state name, returning the existing id if already seen.
    pub fn intern_state(&mut self, name: &str) -> StateId {
        if let Some(&id) = self.state_names.get(name) {
            return id;
        }
        let id = StateId(self.states.len() as u32);
        self.states.push(name.to_string());
        self.state_names.insert(name.to_string(), id);
        id
    }

    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.state_names.get(name).copied()
    }

    pub fn state_name(&self, id: StateId) -> Option<&str> {
        self.states.get(id.0 as usize).map(String::as_str)
    }

    /// Number of interned states.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Interns a program name, returning the existing id if already seen.
    pub fn intern_program(&mut self, name: &str) -> ProgramId {
        if let Some(&id) = self.program_names.get(name) {
            return id;
        }
        let id = ProgramId(self.programs.len() as u32);
        self.programs.push(name.to_string());
        self.program_names.insert(name.to_string(), id);
        id
    }

    pub fn program_id(&self, name: &str) -> Option<ProgramId> {
        self.program_names.get(name).copied()
    }

    pub fn program_name(&self, id: ProgramId) -> Option<&str> {
        self.programs.get(id.0 as usize).map(String::as_str)
    }

    /// Current registration epoch.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Drops every registration and starts a new epoch.
    pub fn reset(&mut self) {
        let epoch = self.epoch + 1;
        *self = Registry {
            epoch,
            ..Registry::default()
        };
    }
}
