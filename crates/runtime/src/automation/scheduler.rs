use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::debug;

use super::rules::{TriggerActionRule, TriggerType};

/// Interval rules: fire on first sight, then whenever `interval_seconds`
/// have passed since the last fire.
#[derive(Debug, Clone, Default)]
pub struct SchedulerEngine {
    last_run: HashMap<String, DateTime<Utc>>,
}

impl SchedulerEngine {
    pub fn triggered_rules(&mut self, rules: &[TriggerActionRule], now: DateTime<Utc>) -> Vec<String> {
        let mut fired = Vec::new();
        for rule in rules.iter().filter(|r| r.trigger_type == TriggerType::Schedule) {
            let interval = interval_seconds(rule);
            if interval <= 0 {
                debug!(rule_id = %rule.rule_id, "schedule rule without a positive interval");
                continue;
            }
            let due = self
                .last_run
                .get(&rule.rule_id)
                .is_none_or(|previous| now - *previous >= Duration::seconds(interval));
            if due {
                self.last_run.insert(rule.rule_id.clone(), now);
                fired.push(rule.rule_id.clone());
            }
        }
        fired
    }
}

/// Integer, float or numeric string; anything else is zero.
fn interval_seconds(rule: &TriggerActionRule) -> i64 {
    match rule.trigger_config.get("interval_seconds") {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 18, 9, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    #[test]
    fn fires_first_then_after_interval() {
        let rules = vec![TriggerActionRule::schedule("sched-1", "refresh", 60, "sys info")];
        let mut scheduler = SchedulerEngine::default();
        let fires: Vec<bool> = [0, 30, 61]
            .into_iter()
            .map(|s| !scheduler.triggered_rules(&rules, t(s)).is_empty())
            .collect();
        assert_eq!(fires, vec![true, false, true]);
    }

    #[test]
    fn same_instant_is_idempotent() {
        let rules = vec![TriggerActionRule::schedule("sched-1", "refresh", 60, "sys info")];
        let mut scheduler = SchedulerEngine::default();
        assert_eq!(scheduler.triggered_rules(&rules, t(0)).len(), 1);
        assert!(scheduler.triggered_rules(&rules, t(0)).is_empty());
    }

    #[test]
    fn non_positive_or_malformed_intervals_never_fire() {
        let mut bad = TriggerActionRule::schedule("s", "s", 0, "sys info");
        let mut scheduler = SchedulerEngine::default();
        assert!(scheduler.triggered_rules(std::slice::from_ref(&bad), t(0)).is_empty());

        bad.trigger_config.insert("interval_seconds".to_string(), Value::from("soon"));
        assert!(scheduler.triggered_rules(std::slice::from_ref(&bad), t(0)).is_empty());

        bad.trigger_config.insert("interval_seconds".to_string(), Value::from("45"));
        assert_eq!(scheduler.triggered_rules(std::slice::from_ref(&bad), t(0)).len(), 1);
    }

    #[test]
    fn file_watch_rules_are_ignored() {
        let rules = vec![TriggerActionRule::file_watch("w", "w", "/tmp", "*", "sys info")];
        assert!(SchedulerEngine::default().triggered_rules(&rules, t(0)).is_empty());
    }
}
