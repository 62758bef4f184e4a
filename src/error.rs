// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Error taxonomy
//!
//! Each error type maps to one handling policy: malformed input is dropped,
//! evaluation errors make a condition false, dispatch errors are logged, and
//! only definition errors are fatal (at load time).

use thiserror::Error;

/// Inbound record could not be turned into a telemetry event
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedInputError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' has the wrong type, expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("deviceData is not numeric: {0}")]
    NonNumericReading(String),
}

/// A condition or value expression referenced something that cannot be resolved
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("input field '{0}' referenced without an input event")]
    NoInput(String),

    #[error("unknown input field '{0}'")]
    UnknownInputField(String),

    #[error("expression produced a non-finite value")]
    NonFinite,
}

/// Notification could not be handed to a sink
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("no notification sink configured for target '{0}'")]
    NoSink(String),

    #[error("sink '{target}' failed: {reason}")]
    SinkFailed { target: String, reason: String },
}

/// Detector model failed structural validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidDefinitionError {
    #[error("definition has no states")]
    NoStates,

    #[error("duplicate state name '{0}'")]
    DuplicateState(String),

    #[error("initial state '{0}' is not defined")]
    UnknownInitialState(String),

    #[error("transition '{rule}' in state '{state}' targets undefined state '{next}'")]
    UnknownNextState {
        state: String,
        rule: String,
        next: String,
    },

    #[error("empty {0} name")]
    EmptyName(&'static str),

    #[error("timer '{timer}' in rule '{rule}' must have a positive duration")]
    NonPositiveTimer { rule: String, timer: String },

    #[error("failed to parse definition: {0}")]
    Parse(String),

    #[error("failed to read definition: {0}")]
    Io(String),
}

/// One-time setup or teardown call against the provisioning catalog failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProvisioningError {
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("{kind} '{name}' does not exist")]
    NotFound { kind: &'static str, name: String },

    #[error("missing resource property '{0}'")]
    MissingProperty(&'static str),

    #[error(transparent)]
    Definition(#[from] InvalidDefinitionError),

    #[error("acknowledgment delivery failed: {0}")]
    Acknowledgment(String),
}
