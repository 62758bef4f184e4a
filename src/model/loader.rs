// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Definition loading and structural validation

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Action, Definition};
use crate::error::InvalidDefinitionError;

/// Serialized form of a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Json,
    Toml,
}

impl DefinitionFormat {
    /// Pick a format from a file extension, JSON when unknown
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => DefinitionFormat::Toml,
            _ => DefinitionFormat::Json,
        }
    }
}

/// Parse and validate a definition from text
pub fn load(source: &str, format: DefinitionFormat) -> Result<Arc<Definition>, InvalidDefinitionError> {
    let definition: Definition = match format {
        DefinitionFormat::Json => serde_json::from_str(source)
            .map_err(|e| InvalidDefinitionError::Parse(e.to_string()))?,
        DefinitionFormat::Toml => {
            toml::from_str(source).map_err(|e| InvalidDefinitionError::Parse(e.to_string()))?
        }
    };
    freeze(definition)
}

/// Read, parse and validate a definition file
pub fn load_file(path: &Path) -> Result<Arc<Definition>, InvalidDefinitionError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| InvalidDefinitionError::Io(e.to_string()))?;
    let definition = load(&content, DefinitionFormat::from_path(path))?;
    info!(
        "Loaded detector model '{}' ({} states) from {:?}",
        definition.name,
        definition.states.len(),
        path
    );
    Ok(definition)
}

/// Validate an in-memory definition and make it immutable
pub fn freeze(definition: Definition) -> Result<Arc<Definition>, InvalidDefinitionError> {
    validate(&definition)?;
    Ok(Arc::new(definition))
}

/// Structural checks that must hold before any evaluation
pub fn validate(definition: &Definition) -> Result<(), InvalidDefinitionError> {
    if definition.name.trim().is_empty() {
        return Err(InvalidDefinitionError::EmptyName("definition"));
    }
    if definition.states.is_empty() {
        return Err(InvalidDefinitionError::NoStates);
    }

    let mut names = HashSet::new();
    for state in &definition.states {
        if state.name.trim().is_empty() {
            return Err(InvalidDefinitionError::EmptyName("state"));
        }
        if !names.insert(state.name.as_str()) {
            return Err(InvalidDefinitionError::DuplicateState(state.name.clone()));
        }
    }

    if !names.contains(definition.initial_state.as_str()) {
        return Err(InvalidDefinitionError::UnknownInitialState(
            definition.initial_state.clone(),
        ));
    }

    for state in &definition.states {
        for rule in &state.transitions {
            if !names.contains(rule.next_state.as_str()) {
                return Err(InvalidDefinitionError::UnknownNextState {
                    state: state.name.clone(),
                    rule: rule.name.clone(),
                    next: rule.next_state.clone(),
                });
            }
        }
    }

    let mut armed = HashSet::new();
    for (rule, action) in definition.actions() {
        match action {
            Action::SetVariable { name, .. } | Action::ResetTimer { name } if name.is_empty() => {
                return Err(InvalidDefinitionError::EmptyName("variable or timer"));
            }
            Action::SetTimer { name, seconds } => {
                if name.is_empty() {
                    return Err(InvalidDefinitionError::EmptyName("timer"));
                }
                if *seconds == 0 {
                    return Err(InvalidDefinitionError::NonPositiveTimer {
                        rule: rule.to_string(),
                        timer: name.clone(),
                    });
                }
                armed.insert(name.as_str());
            }
            Action::Notify { target } if target.is_empty() => {
                return Err(InvalidDefinitionError::EmptyName("notification target"));
            }
            _ => {}
        }
    }

    // Not fatal: a timeout on a timer nothing arms simply never fires.
    for state in &definition.states {
        let conditions = state
            .on_enter
            .iter()
            .chain(&state.on_input)
            .chain(&state.on_exit)
            .map(|r| &r.condition)
            .chain(state.transitions.iter().map(|r| &r.condition));
        for condition in conditions {
            for timer in condition.timers() {
                if !armed.contains(timer) {
                    warn!(
                        "State '{}' waits on timer '{}' which no rule ever sets",
                        state.name, timer
                    );
                }
            }
        }
    }

    Ok(())
}
