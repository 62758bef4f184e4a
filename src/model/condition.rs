// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Typed conditions and value expressions
//!
//! Conditions are plain data that the evaluator interprets against an
//! instance's variables, the current input and its timers. They serialize as
//! externally tagged enums so a definition file reads like:
//!
//! ```text
//! { "compare": { "lhs": { "var": "errorEvent" }, "op": "gt", "rhs": { "const": 4 } } }
//! ```

use serde::{Deserialize, Serialize};

/// Numeric value expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Literal number
    Const(f64),
    /// Instance variable, 0 when unset
    Var(String),
    /// Numeric field of the current input event
    Input(String),
    Add { lhs: Box<Expr>, rhs: Box<Expr> },
    Sub { lhs: Box<Expr>, rhs: Box<Expr> },
    Mul { lhs: Box<Expr>, rhs: Box<Expr> },
}

impl Expr {
    pub fn constant(value: f64) -> Self {
        Expr::Const(value)
    }

    pub fn var(name: &str) -> Self {
        Expr::Var(name.to_string())
    }

    pub fn input(field: &str) -> Self {
        Expr::Input(field.to_string())
    }

    pub fn plus(self, other: Expr) -> Self {
        Expr::Add {
            lhs: Box::new(self),
            rhs: Box::new(other),
        }
    }

    pub fn minus(self, other: Expr) -> Self {
        Expr::Sub {
            lhs: Box::new(self),
            rhs: Box::new(other),
        }
    }

    pub fn times(self, other: Expr) -> Self {
        Expr::Mul {
            lhs: Box::new(self),
            rhs: Box::new(other),
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }
}

/// Boolean predicate over input, variables and timers
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    #[default]
    True,
    False,
    Compare {
        lhs: Expr,
        op: CmpOp,
        rhs: Expr,
    },
    /// Short-circuits left to right
    And(Vec<Condition>),
    /// Short-circuits left to right
    Or(Vec<Condition>),
    Not(Box<Condition>),
    /// True once per expiry of the named timer
    Timeout(String),
}

impl Condition {
    pub fn compare(lhs: Expr, op: CmpOp, rhs: Expr) -> Self {
        Condition::Compare { lhs, op, rhs }
    }

    pub fn timeout(timer: &str) -> Self {
        Condition::Timeout(timer.to_string())
    }

    pub fn and(self, other: Condition) -> Self {
        match self {
            Condition::And(mut all) => {
                all.push(other);
                Condition::And(all)
            }
            first => Condition::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Condition) -> Self {
        match self {
            Condition::Or(mut any) => {
                any.push(other);
                Condition::Or(any)
            }
            first => Condition::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// Timer names referenced anywhere in this condition
    pub fn timers(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_timers(&mut out);
        out
    }

    fn collect_timers<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Timeout(name) => out.push(name),
            Condition::And(parts) | Condition::Or(parts) => {
                for part in parts {
                    part.collect_timers(out);
                }
            }
            Condition::Not(inner) => inner.collect_timers(out),
            _ => {}
        }
    }
}
