// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Per-instance logical timers
//!
//! Timers are deadlines compared against the evaluation clock, never OS
//! waits. The first evaluation that looks at an expired timer consumes it,
//! and it stays inactive until set or reset again.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Longest accepted countdown, keeps deadline arithmetic in range
pub const MAX_TIMER_SECS: u64 = u32::MAX as u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timer {
    /// Last configured duration, reused by reset
    pub duration_secs: u64,
    pub deadline: DateTime<Utc>,
    /// False once the expiry has been consumed
    pub active: bool,
}

/// Named timers of one detector instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timers {
    timers: BTreeMap<String, Timer>,
}

fn deadline_after(now: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    let secs = seconds.min(MAX_TIMER_SECS) as i64;
    now.checked_add_signed(Duration::seconds(secs))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm or re-arm `name` to expire `seconds` from `now`
    pub fn set(&mut self, name: &str, seconds: u64, now: DateTime<Utc>) {
        self.timers.insert(
            name.to_string(),
            Timer {
                duration_secs: seconds,
                deadline: deadline_after(now, seconds),
                active: true,
            },
        );
    }

    /// Re-arm with the last configured duration.
    ///
    /// Returns false, leaving everything untouched, for a timer that was never set.
    pub fn reset(&mut self, name: &str, now: DateTime<Utc>) -> bool {
        match self.timers.get_mut(name) {
            Some(timer) => {
                timer.deadline = deadline_after(now, timer.duration_secs);
                timer.active = true;
                true
            }
            None => false,
        }
    }

    /// Disarm without forgetting the duration
    pub fn cancel(&mut self, name: &str) -> bool {
        match self.timers.get_mut(name) {
            Some(timer) if timer.active => {
                timer.active = false;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self, name: &str) -> bool {
        self.timers.get(name).map(|t| t.active).unwrap_or(false)
    }

    pub fn is_expired(&self, name: &str, now: DateTime<Utc>) -> bool {
        self.timers
            .get(name)
            .map(|t| t.active && now >= t.deadline)
            .unwrap_or(false)
    }

    /// Mark an observed expiry as used
    pub fn consume(&mut self, name: &str) {
        if let Some(timer) = self.timers.get_mut(name) {
            timer.active = false;
        }
    }

    pub fn get(&self, name: &str) -> Option<&Timer> {
        self.timers.get(name)
    }

    /// Earliest deadline among armed timers
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers
            .values()
            .filter(|t| t.active)
            .map(|t| t.deadline)
            .min()
    }

    /// Whether an armed timer crossed its deadline in `(since, now]`
    pub fn expired_between(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.timers
            .values()
            .any(|t| t.active && t.deadline > since && t.deadline <= now)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Timer)> {
        self.timers.iter()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_set_and_expire() {
        let mut timers = Timers::new();
        timers.set("cooldown", 120, t0());

        assert!(timers.is_armed("cooldown"));
        assert!(!timers.is_expired("cooldown", t0() + Duration::seconds(119)));
        assert!(timers.is_expired("cooldown", t0() + Duration::seconds(120)));
        assert_eq!(timers.next_deadline(), Some(t0() + Duration::seconds(120)));
    }

    #[test]
    fn test_consume_is_one_shot() {
        let mut timers = Timers::new();
        timers.set("cooldown", 10, t0());
        let later = t0() + Duration::seconds(30);

        assert!(timers.is_expired("cooldown", later));
        timers.consume("cooldown");
        assert!(!timers.is_expired("cooldown", later));
        assert!(!timers.is_expired("cooldown", later + Duration::days(1)));
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn test_reset_reuses_duration() {
        let mut timers = Timers::new();
        timers.set("silence", 60, t0());
        timers.consume("silence");

        let later = t0() + Duration::seconds(100);
        assert!(timers.reset("silence", later));
        assert!(timers.is_armed("silence"));
        assert_eq!(
            timers.get("silence").unwrap().deadline,
            later + Duration::seconds(60)
        );
    }

    #[test]
    fn test_reset_of_unset_timer_is_noop() {
        let mut timers = Timers::new();
        assert!(!timers.reset("never", t0()));
        assert!(timers.is_empty());
    }

    #[test]
    fn test_set_replaces_deadline() {
        let mut timers = Timers::new();
        timers.set("t", 10, t0());
        timers.set("t", 100, t0());
        assert!(!timers.is_expired("t", t0() + Duration::seconds(50)));
        assert_eq!(timers.get("t").unwrap().duration_secs, 100);
    }

    #[test]
    fn test_cancel_and_window() {
        let mut timers = Timers::new();
        timers.set("a", 10, t0());
        assert!(timers.expired_between(t0(), t0() + Duration::seconds(10)));
        assert!(!timers.expired_between(t0() + Duration::seconds(10), t0() + Duration::seconds(20)));

        assert!(timers.cancel("a"));
        assert!(!timers.cancel("a"));
        assert!(!timers.expired_between(t0(), t0() + Duration::seconds(20)));
    }

    #[test]
    fn test_huge_duration_clamped() {
        let mut timers = Timers::new();
        timers.set("t", u64::MAX, t0());
        assert!(!timers.is_expired("t", t0() + Duration::days(365 * 100)));
    }
}
