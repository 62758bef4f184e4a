// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! FSM evaluation engine
//!
//! One call to [`evaluate`] is one cycle for one instance:
//!
//! ```text
//!  fresh? ──► on_enter(current)
//!  input? ──► on_input(current)            every matching rule fires
//!             transitions(current)         first matching rule wins
//!               └─► actions ─► on_exit(old) ─► current = next ─► on_enter(next)
//! ```
//!
//! Conditions that hit an [`EvaluationError`] are treated as false. Notify
//! actions only collect notifications, dispatch happens after the caller
//! releases the instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::DetectorInstance;
use crate::error::EvaluationError;
use crate::model::{Action, Condition, Definition, EventRule, Expr};
use crate::notify::Notification;
use crate::telemetry::TelemetryEvent;

/// What started an evaluation cycle
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// A device reading
    Input(TelemetryEvent),
    /// Timer check without new input
    Sweep,
}

impl Trigger {
    pub fn input(&self) -> Option<&TelemetryEvent> {
        match self {
            Trigger::Input(event) => Some(event),
            Trigger::Sweep => None,
        }
    }
}

/// A state change taken during a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub key: String,
    pub from: String,
    pub to: String,
    pub rule: String,
}

/// Everything a cycle produced besides the instance mutation
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    /// Names of rules whose conditions held, in firing order
    pub fired: Vec<String>,
    pub transition: Option<Transition>,
    pub notifications: Vec<Notification>,
    pub errors: Vec<EvaluationError>,
}

impl CycleOutcome {
    pub fn is_quiet(&self) -> bool {
        self.fired.is_empty() && self.transition.is_none()
    }
}

struct Cycle<'a> {
    input: Option<&'a TelemetryEvent>,
    now: DateTime<Utc>,
    outcome: CycleOutcome,
}

impl<'a> Cycle<'a> {
    fn value(&self, instance: &DetectorInstance, expr: &Expr) -> Result<f64, EvaluationError> {
        let v = match expr {
            Expr::Const(c) => *c,
            Expr::Var(name) => instance.variable(name),
            Expr::Input(field) => self
                .input
                .ok_or_else(|| EvaluationError::NoInput(field.clone()))?
                .field(field)?,
            Expr::Add { lhs, rhs } => self.value(instance, lhs)? + self.value(instance, rhs)?,
            Expr::Sub { lhs, rhs } => self.value(instance, lhs)? - self.value(instance, rhs)?,
            Expr::Mul { lhs, rhs } => self.value(instance, lhs)? * self.value(instance, rhs)?,
        };
        if v.is_finite() {
            Ok(v)
        } else {
            Err(EvaluationError::NonFinite)
        }
    }

    /// Timers seen expired are pushed to `observed`
    fn check(
        &self,
        instance: &DetectorInstance,
        condition: &Condition,
        observed: &mut Vec<String>,
    ) -> Result<bool, EvaluationError> {
        match condition {
            Condition::True => Ok(true),
            Condition::False => Ok(false),
            Condition::Compare { lhs, op, rhs } => {
                Ok(op.apply(self.value(instance, lhs)?, self.value(instance, rhs)?))
            }
            Condition::And(parts) => {
                for part in parts {
                    if !self.check(instance, part, observed)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Or(parts) => {
                for part in parts {
                    if self.check(instance, part, observed)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not(inner) => Ok(!self.check(instance, inner, observed)?),
            Condition::Timeout(name) => {
                if instance.timers.is_expired(name, self.now) {
                    observed.push(name.clone());
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Evaluate a rule condition. Every expiry it observed is consumed,
    /// whether or not the rule fires.
    fn holds(&mut self, instance: &mut DetectorInstance, rule: &str, condition: &Condition) -> bool {
        let mut observed = Vec::new();
        let result = self.check(instance, condition, &mut observed);
        for timer in &observed {
            instance.timers.consume(timer);
        }
        match result {
            Ok(true) => {
                self.outcome.fired.push(rule.to_string());
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("Rule '{}' on {} treated as false: {}", rule, instance.key, e);
                self.outcome.errors.push(e);
                false
            }
        }
    }

    fn apply(&mut self, instance: &mut DetectorInstance, rule: &str, actions: &[Action]) {
        for action in actions {
            match action {
                Action::SetVariable { name, value } => match self.value(instance, value) {
                    Ok(v) => instance.set_variable(name, v),
                    Err(e) => {
                        warn!("Rule '{}' could not set '{}': {}", rule, name, e);
                        self.outcome.errors.push(e);
                    }
                },
                Action::SetTimer { name, seconds } => {
                    instance.timers.set(name, *seconds, self.now);
                }
                Action::ResetTimer { name } => {
                    if !instance.timers.reset(name, self.now) {
                        debug!(
                            "Rule '{}' reset timer '{}' on {} which was never set, ignored",
                            rule, name, instance.key
                        );
                    }
                }
                Action::Notify { target } => {
                    self.outcome.notifications.push(Notification::from_instance(
                        target,
                        instance,
                        self.input,
                        self.now,
                    ));
                }
            }
        }
    }

    fn run_events(&mut self, instance: &mut DetectorInstance, rules: &[EventRule]) {
        for rule in rules {
            if self.holds(instance, &rule.name, &rule.condition) {
                self.apply(instance, &rule.name, &rule.actions);
            }
        }
    }
}

/// Run one evaluation cycle against `instance`
pub fn evaluate(
    definition: &Definition,
    instance: &mut DetectorInstance,
    trigger: &Trigger,
    now: DateTime<Utc>,
) -> CycleOutcome {
    let mut cycle = Cycle {
        input: trigger.input(),
        now,
        outcome: CycleOutcome::default(),
    };

    let Some(state) = definition.get_state(&instance.current_state) else {
        // Unreachable with a validated definition.
        warn!(
            "Instance {} is in unknown state '{}', resetting to '{}'",
            instance.key, instance.current_state, definition.initial_state
        );
        if !definition.is_valid_state(&definition.initial_state) {
            return cycle.outcome;
        }
        instance.current_state = definition.initial_state.clone();
        instance.fresh = true;
        return evaluate(definition, instance, trigger, now);
    };

    if instance.fresh {
        instance.fresh = false;
        cycle.run_events(instance, &state.on_enter);
    }

    if cycle.input.is_some() {
        cycle.run_events(instance, &state.on_input);
        instance.last_input = Some(now);
    }

    for rule in &state.transitions {
        if !cycle.holds(instance, &rule.name, &rule.condition) {
            continue;
        }

        cycle.apply(instance, &rule.name, &rule.actions);
        cycle.run_events(instance, &state.on_exit);

        let from = std::mem::replace(&mut instance.current_state, rule.next_state.clone());
        info!(
            "Detector {} moved {} -> {} via '{}'",
            instance.key, from, rule.next_state, rule.name
        );

        if let Some(next) = definition.get_state(&rule.next_state) {
            cycle.run_events(instance, &next.on_enter);
        }

        cycle.outcome.transition = Some(Transition {
            key: instance.key.clone(),
            from,
            to: rule.next_state.clone(),
            rule: rule.name.clone(),
        });
        break;
    }

    instance.last_evaluated = now;
    instance.cycles += 1;
    cycle.outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::templates::{self, RemoteMonitoringParams, COOLDOWN_TIMER, ERROR_COUNTER};
    use crate::model::{CmpOp, StateDef, TransitionRule};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn reading(value: f64) -> Trigger {
        Trigger::Input(TelemetryEvent::new("RM_Accelerator", "AWS98765", value))
    }

    fn fresh(def: &Definition) -> DetectorInstance {
        DetectorInstance::new("RM_Accelerator:AWS98765", &def.initial_state, t0())
    }

    #[test]
    fn test_enter_events_run_before_first_input() {
        let def = Definition::new("m", "A").state(
            StateDef::new("A")
                .on_enter(
                    EventRule::new("init", Condition::True)
                        .action(Action::set_variable("x", Expr::constant(10.0))),
                )
                .on_input(
                    EventRule::new("bump", Condition::True)
                        .action(Action::set_variable("x", Expr::var("x").plus(Expr::constant(1.0)))),
                ),
        );
        let mut instance = fresh(&def);

        let outcome = evaluate(&def, &mut instance, &reading(1.0), t0());
        assert_eq!(outcome.fired, vec!["init".to_string(), "bump".to_string()]);
        assert_eq!(instance.variable("x"), 11.0);
        assert!(!instance.fresh);

        evaluate(&def, &mut instance, &reading(1.0), t0());
        assert_eq!(instance.variable("x"), 12.0);
    }

    #[test]
    fn test_sequential_writes_visible_within_rule() {
        let def = Definition::new("m", "A").state(
            StateDef::new("A").on_input(
                EventRule::new("chain", Condition::True)
                    .action(Action::set_variable("a", Expr::constant(2.0)))
                    .action(Action::set_variable("b", Expr::var("a").times(Expr::constant(3.0)))),
            ),
        );
        let mut instance = fresh(&def);
        evaluate(&def, &mut instance, &reading(0.0), t0());
        assert_eq!(instance.variable("b"), 6.0);
    }

    #[test]
    fn test_first_matching_transition_wins() {
        let def = Definition::new("m", "A")
            .state(
                StateDef::new("A")
                    .transition(TransitionRule::new("first", Condition::True, "B"))
                    .transition(TransitionRule::new("second", Condition::True, "C")),
            )
            .state(StateDef::new("B"))
            .state(StateDef::new("C"));
        let mut instance = fresh(&def);

        let outcome = evaluate(&def, &mut instance, &reading(0.0), t0());
        assert_eq!(instance.current_state, "B");
        assert_eq!(outcome.transition.unwrap().rule, "first");
        assert!(!outcome.fired.contains(&"second".to_string()));
    }

    #[test]
    fn test_exit_then_enter_on_transition() {
        let def = Definition::new("m", "A")
            .state(
                StateDef::new("A")
                    .on_exit(
                        EventRule::new("leaving", Condition::True)
                            .action(Action::set_variable("order", Expr::constant(1.0))),
                    )
                    .transition(TransitionRule::new("go", Condition::True, "B")),
            )
            .state(
                StateDef::new("B").on_enter(
                    EventRule::new("arriving", Condition::True).action(Action::set_variable(
                        "order",
                        Expr::var("order").times(Expr::constant(10.0)),
                    )),
                ),
            );
        let mut instance = fresh(&def);
        let outcome = evaluate(&def, &mut instance, &Trigger::Sweep, t0());

        assert_eq!(instance.variable("order"), 10.0);
        assert_eq!(
            outcome.fired,
            vec!["go".to_string(), "leaving".to_string(), "arriving".to_string()]
        );
    }

    #[test]
    fn test_input_reference_during_sweep_is_false() {
        let def = Definition::new("m", "A").state(
            StateDef::new("A").transition(TransitionRule::new(
                "high",
                Condition::compare(Expr::input("deviceData"), CmpOp::Gt, Expr::constant(1.0)),
                "A",
            )),
        );
        let mut instance = fresh(&def);
        let outcome = evaluate(&def, &mut instance, &Trigger::Sweep, t0());

        assert!(outcome.transition.is_none());
        assert_eq!(
            outcome.errors,
            vec![EvaluationError::NoInput("deviceData".to_string())]
        );
    }

    #[test]
    fn test_unknown_field_fails_closed() {
        let def = Definition::new("m", "A").state(
            StateDef::new("A").on_input(
                EventRule::new(
                    "bad",
                    Condition::compare(Expr::input("humidity"), CmpOp::Gt, Expr::constant(0.0)),
                )
                .action(Action::set_variable("x", Expr::constant(1.0))),
            ),
        );
        let mut instance = fresh(&def);
        let outcome = evaluate(&def, &mut instance, &reading(5.0), t0());

        assert_eq!(instance.variable("x"), 0.0);
        assert_eq!(
            outcome.errors,
            vec![EvaluationError::UnknownInputField("humidity".to_string())]
        );
    }

    #[test]
    fn test_timeout_fires_once_per_arm() {
        let def = Definition::new("m", "A").state(
            StateDef::new("A")
                .on_enter(
                    EventRule::new("arm", Condition::True).action(Action::set_timer("t", 30)),
                )
                .on_input(
                    EventRule::new("expired", Condition::timeout("t")).action(
                        Action::set_variable("hits", Expr::var("hits").plus(Expr::constant(1.0))),
                    ),
                ),
        );
        let mut instance = fresh(&def);
        evaluate(&def, &mut instance, &reading(0.0), t0());

        for secs in [31, 40, 3600] {
            evaluate(&def, &mut instance, &reading(0.0), t0() + Duration::seconds(secs));
        }
        assert_eq!(instance.variable("hits"), 1.0);
    }

    #[test]
    fn test_timeout_consumed_when_observed_even_if_rule_fails() {
        let def = Definition::new("m", "A")
            .state(
                StateDef::new("A")
                    .on_enter(
                        EventRule::new("arm", Condition::True).action(Action::set_timer("t", 10)),
                    )
                    .on_input(EventRule::new(
                        "gate",
                        Condition::timeout("t").and(Condition::False),
                    ))
                    .transition(TransitionRule::new(
                        "later",
                        Condition::compare(Expr::var("ok"), CmpOp::Eq, Expr::constant(1.0))
                            .and(Condition::timeout("t")),
                        "B",
                    )),
            )
            .state(StateDef::new("B"));
        let mut instance = fresh(&def);
        evaluate(&def, &mut instance, &reading(0.0), t0());

        let outcome = evaluate(&def, &mut instance, &reading(0.0), t0() + Duration::seconds(20));
        assert!(outcome.fired.is_empty());
        assert!(!instance.timers.is_armed("t"));
        assert!(!instance.timers.is_expired("t", t0() + Duration::seconds(30)));

        instance.set_variable("ok", 1.0);
        let outcome = evaluate(&def, &mut instance, &reading(0.0), t0() + Duration::seconds(500));
        assert!(outcome.transition.is_none());
        assert_eq!(instance.current_state, "A");
    }

    #[test]
    fn test_short_circuit_skips_timer_observation() {
        let def = Definition::new("m", "A")
            .state(
                StateDef::new("A")
                    .on_enter(
                        EventRule::new("arm", Condition::True).action(Action::set_timer("t", 10)),
                    )
                    .transition(TransitionRule::new(
                        "leave",
                        Condition::compare(Expr::var("ok"), CmpOp::Eq, Expr::constant(1.0))
                            .and(Condition::timeout("t")),
                        "B",
                    )),
            )
            .state(StateDef::new("B"));
        let mut instance = fresh(&def);
        evaluate(&def, &mut instance, &Trigger::Sweep, t0());

        // `ok` is 0, so the timeout is never looked at.
        evaluate(&def, &mut instance, &Trigger::Sweep, t0() + Duration::seconds(20));
        assert!(instance.timers.is_expired("t", t0() + Duration::seconds(20)));

        instance.set_variable("ok", 1.0);
        let outcome = evaluate(&def, &mut instance, &Trigger::Sweep, t0() + Duration::seconds(21));
        assert_eq!(outcome.transition.unwrap().rule, "leave");
        assert!(!instance.timers.is_armed("t"));
    }

    #[test]
    fn test_remote_monitoring_alert_once_then_recover() {
        let def = templates::remote_monitoring(&RemoteMonitoringParams::default());
        let mut instance = fresh(&def);
        let mut alerts = 0;

        for i in 0..5 {
            let outcome = evaluate(&def, &mut instance, &reading(4100.0), t0() + Duration::seconds(i));
            alerts += outcome.notifications.len();
            if i < 4 {
                assert_eq!(instance.current_state, templates::NORMAL_STATE);
            }
        }
        assert_eq!(instance.current_state, templates::ERROR_STATE);
        assert_eq!(alerts, 1);
        assert_eq!(instance.variable(ERROR_COUNTER), 0.0);
        assert!(instance.timers.is_armed(COOLDOWN_TIMER));

        // Cooldown still running: good data does not leave Error.
        evaluate(&def, &mut instance, &reading(100.0), t0() + Duration::seconds(60));
        assert_eq!(instance.current_state, templates::ERROR_STATE);

        let outcome = evaluate(&def, &mut instance, &Trigger::Sweep, t0() + Duration::seconds(200));
        assert_eq!(instance.current_state, templates::NORMAL_STATE);
        assert_eq!(outcome.transition.unwrap().rule, "NormalTransition");
        assert!(outcome.notifications.is_empty());
    }
}
