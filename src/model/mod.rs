// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Detector model - states, rules, conditions and actions as data

mod condition;
mod definition;
pub mod loader;
pub mod templates;

pub use condition::{CmpOp, Condition, Expr};
pub use definition::{Action, Definition, EventRule, KeyAttribute, StateDef, TransitionRule};
pub use loader::DefinitionFormat;
pub use templates::RemoteMonitoringParams;
