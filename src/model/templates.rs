// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Built-in detector models

use serde::{Deserialize, Serialize};

use super::{Action, CmpOp, Condition, Definition, EventRule, Expr, KeyAttribute, StateDef, TransitionRule};

pub const NORMAL_STATE: &str = "Normal";
pub const ERROR_STATE: &str = "Error";

/// Consecutive out-of-range readings
pub const ERROR_COUNTER: &str = "errorEvent";
/// 1 once the silence watchdog has been armed in the current Normal episode
pub const INPUT_RECEIVED: &str = "inputReceived";
pub const COOLDOWN_TIMER: &str = "cooldown";
pub const SILENCE_TIMER: &str = "dataReceived";

pub const READING_FIELD: &str = "deviceData";

/// Knobs for the remote monitoring model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMonitoringParams {
    /// Model name
    pub name: String,

    /// Readings strictly above this are errors
    pub threshold: f64,

    /// Consecutive errors that move a device to Error
    pub error_count: u32,

    /// Seconds an Error episode suppresses further alerts
    pub cooldown_secs: u64,

    /// Raise an Error when a device goes quiet this long
    pub silence_timeout_secs: Option<u64>,

    /// Notification target for the alert sent on entering Error
    pub notify_target: String,

    /// Instance partitioning
    pub key: KeyAttribute,
}

impl Default for RemoteMonitoringParams {
    fn default() -> Self {
        Self {
            name: "RemoteMonitoringDetector".to_string(),
            threshold: 2049.0,
            error_count: 5,
            cooldown_secs: 120,
            silence_timeout_secs: Some(120),
            notify_target: "alerts".to_string(),
            key: KeyAttribute::Composite,
        }
    }
}

/// Normal/Error detector: count consecutive readings above the threshold,
/// alert once on entering Error, return to Normal once the cooldown has run
/// out. A device that keeps failing alerts again once per cooldown.
pub fn remote_monitoring(params: &RemoteMonitoringParams) -> Definition {
    let reading = || Expr::input(READING_FIELD);
    let counter = || Expr::var(ERROR_COUNTER);
    let threshold = Expr::constant(params.threshold);

    let count_error = EventRule::new(
        "ErrorData",
        Condition::compare(reading(), CmpOp::Gt, threshold.clone()),
    )
    .action(Action::set_variable(ERROR_COUNTER, counter().plus(Expr::constant(1.0))));

    let clear_errors = EventRule::new(
        "GoodData",
        Condition::compare(reading(), CmpOp::Le, threshold),
    )
    .action(Action::set_variable(ERROR_COUNTER, Expr::constant(0.0)));

    let mut normal = StateDef::new(NORMAL_STATE).on_enter(
        EventRule::new("InitializeErrorCounter", Condition::True)
            .action(Action::set_variable(ERROR_COUNTER, Expr::constant(0.0))),
    );

    let mut to_error = Condition::compare(
        counter(),
        CmpOp::Ge,
        Expr::constant(f64::from(params.error_count)),
    );
    let mut to_normal = TransitionRule::new(
        "NormalTransition",
        Condition::compare(counter(), CmpOp::Eq, Expr::constant(0.0))
            .and(Condition::timeout(COOLDOWN_TIMER)),
        NORMAL_STATE,
    );

    if let Some(silence) = params.silence_timeout_secs {
        let received = || Expr::var(INPUT_RECEIVED);
        normal = normal
            .on_enter(
                EventRule::new("InitializeInputReceived", Condition::True)
                    .action(Action::set_variable(INPUT_RECEIVED, Expr::constant(0.0))),
            )
            .on_input(
                EventRule::new(
                    "TimerStart",
                    Condition::compare(received(), CmpOp::Eq, Expr::constant(0.0)),
                )
                .action(Action::set_timer(SILENCE_TIMER, silence)),
            )
            .on_input(
                EventRule::new(
                    "TimerReset",
                    Condition::compare(received(), CmpOp::Eq, Expr::constant(1.0)),
                )
                .action(Action::reset_timer(SILENCE_TIMER)),
            )
            .on_input(
                EventRule::new("InputReceived", Condition::True)
                    .action(Action::set_variable(INPUT_RECEIVED, Expr::constant(1.0))),
            );
        to_error = to_error.or(Condition::timeout(SILENCE_TIMER));
        to_normal = to_normal.action(Action::reset_timer(SILENCE_TIMER));
    }

    let normal = normal
        .on_input(count_error)
        .on_input(clear_errors)
        .transition(TransitionRule::new("ErrorTransition", to_error, ERROR_STATE));

    let error = StateDef::new(ERROR_STATE)
        .on_enter(
            EventRule::new("SendAlertOnEnterError", Condition::True)
                .action(Action::set_variable(ERROR_COUNTER, Expr::constant(0.0)))
                .action(Action::notify(&params.notify_target))
                .action(Action::set_timer(COOLDOWN_TIMER, params.cooldown_secs)),
        )
        .on_input(
            EventRule::new("DataOnError", Condition::True)
                .action(Action::set_variable(ERROR_COUNTER, Expr::constant(0.0))),
        )
        .transition(to_normal);

    Definition::new(&params.name, NORMAL_STATE)
        .with_description("Detector model for remote device monitoring")
        .with_key(params.key)
        .state(normal)
        .state(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_shape() {
        let def = remote_monitoring(&RemoteMonitoringParams::default());
        assert_eq!(def.initial_state, NORMAL_STATE);
        assert_eq!(def.states.len(), 2);
        assert_eq!(def.notify_targets(), vec!["alerts".to_string()]);

        let normal = def.get_state(NORMAL_STATE).unwrap();
        assert_eq!(normal.on_input.len(), 5);
        assert_eq!(normal.transitions[0].next_state, ERROR_STATE);

        let error = def.get_state(ERROR_STATE).unwrap();
        assert_eq!(error.on_input.len(), 1);
        assert_eq!(error.on_input[0].name, "DataOnError");
    }

    #[test]
    fn test_without_silence_watchdog() {
        let params = RemoteMonitoringParams {
            silence_timeout_secs: None,
            ..Default::default()
        };
        let def = remote_monitoring(&params);
        let normal = def.get_state(NORMAL_STATE).unwrap();
        assert_eq!(normal.on_input.len(), 2);
        assert!(normal.transitions[0].condition.timers().is_empty());
    }

    #[test]
    fn test_silence_watchdog_adds_timer_rules() {
        let params = RemoteMonitoringParams {
            silence_timeout_secs: Some(120),
            ..Default::default()
        };
        let def = remote_monitoring(&params);
        let normal = def.get_state(NORMAL_STATE).unwrap();
        assert_eq!(normal.on_enter.len(), 2);
        assert_eq!(normal.on_input.len(), 5);
        assert_eq!(normal.transitions[0].condition.timers(), vec![SILENCE_TIMER]);

        let error = def.get_state(ERROR_STATE).unwrap();
        assert_eq!(error.transitions[0].actions, vec![Action::reset_timer(SILENCE_TIMER)]);
    }
}
