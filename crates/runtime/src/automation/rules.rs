//! Trigger-action rules and the file formats they load from.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use kendali_tools::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Schedule,
    FileWatch,
    /// Unrecognized trigger names load fine but never fire.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerActionRule {
    pub rule_id: String,
    pub name: String,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub trigger_config: Map<String, Value>,
    pub action_command: String,
    #[serde(default, deserialize_with = "risk_level_any_case")]
    pub risk_level: RiskLevel,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

fn risk_level_any_case<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<RiskLevel, D::Error> {
    String::deserialize(deserializer)?.parse().map_err(de::Error::custom)
}

impl TriggerActionRule {
    pub fn schedule(rule_id: &str, name: &str, interval_seconds: i64, action_command: &str) -> Self {
        let mut trigger_config = Map::new();
        trigger_config.insert("interval_seconds".to_string(), Value::from(interval_seconds));
        Self {
            rule_id: rule_id.to_string(),
            name: name.to_string(),
            trigger_type: TriggerType::Schedule,
            trigger_config,
            action_command: action_command.to_string(),
            risk_level: RiskLevel::Low,
            enabled: true,
        }
    }

    pub fn file_watch(rule_id: &str, name: &str, path: &str, pattern: &str, action_command: &str) -> Self {
        let mut trigger_config = Map::new();
        trigger_config.insert("path".to_string(), Value::from(path));
        trigger_config.insert("pattern".to_string(), Value::from(pattern));
        Self {
            rule_id: rule_id.to_string(),
            name: name.to_string(),
            trigger_type: TriggerType::FileWatch,
            trigger_config,
            action_command: action_command.to_string(),
            risk_level: RiskLevel::Low,
            enabled: true,
        }
    }

    pub fn with_risk(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    /// String field from `trigger_config`.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.trigger_config.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<TriggerActionRule>,
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("unsupported rule file format '{extension}' (expected .json, .yaml or .yml)")]
    UnsupportedFormat { extension: String },
}

/// Rules keyed by id, kept in registration order.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<TriggerActionRule>,
}

impl RuleRegistry {
    /// Insert or replace by `rule_id`; a replaced rule keeps its position.
    pub fn register(&mut self, rule: TriggerActionRule) {
        match self.rules.iter_mut().find(|r| r.rule_id == rule.rule_id) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
    }

    pub fn get(&self, rule_id: &str) -> Option<&TriggerActionRule> {
        self.rules.iter().find(|r| r.rule_id == rule_id)
    }

    pub fn rules(&self) -> &[TriggerActionRule] {
        &self.rules
    }

    pub fn enabled_rules(&self) -> Vec<TriggerActionRule> {
        self.rules.iter().filter(|r| r.enabled).cloned().collect()
    }

    /// `false` when no rule has this id.
    pub fn set_enabled(&mut self, rule_id: &str, enabled: bool) -> bool {
        let Some(rule) = self.rules.iter_mut().find(|r| r.rule_id == rule_id) else {
            return false;
        };
        rule.enabled = enabled;
        debug!(rule_id, enabled, "rule toggled");
        true
    }

    /// Load `{rules: [...]}` from JSON or YAML, chosen by extension.
    /// Returns how many rules the file declared.
    pub fn load_from_file(&mut self, path: &Path) -> Result<usize> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let raw = fs::read_to_string(path).with_context(|| format!("read rule file {}", path.display()))?;

        let file: RuleFile = match extension.as_str() {
            "json" => serde_json::from_str(&raw).with_context(|| format!("parse JSON rules {}", path.display()))?,
            "yaml" | "yml" => {
                // An empty YAML document is an empty rule set.
                serde_yaml::from_str::<Option<RuleFile>>(&raw)
                    .with_context(|| format!("parse YAML rules {}", path.display()))?
                    .unwrap_or_default()
            }
            _ => return Err(RuleError::UnsupportedFormat { extension }.into()),
        };

        let count = file.rules.len();
        for rule in file.rules {
            self.register(rule);
        }
        info!(path = %path.display(), count, "automation rules loaded");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_json_rules_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(
            &path,
            r#"{"rules": [{
                "rule_id": "sched-1",
                "name": "run sys info",
                "trigger_type": "schedule",
                "trigger_config": {"interval_seconds": 60},
                "action_command": "sys info"
            }]}"#,
        )
        .unwrap();

        let mut registry = RuleRegistry::default();
        assert_eq!(registry.load_from_file(&path).unwrap(), 1);
        let rule = registry.get("sched-1").unwrap();
        assert_eq!(rule.action_command, "sys info");
        assert_eq!(rule.risk_level, RiskLevel::Low);
        assert!(rule.enabled);
        assert_eq!(rule.trigger_type, TriggerType::Schedule);
    }

    #[test]
    fn load_yaml_rules() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.yml");
        fs::write(
            &path,
            "rules:\n  - rule_id: watch-1\n    name: watch reports\n    trigger_type: file_watch\n    trigger_config:\n      path: /tmp/reports\n      pattern: \"*.txt\"\n    action_command: search file report\n    risk_level: high\n    enabled: false\n",
        )
        .unwrap();

        let mut registry = RuleRegistry::default();
        assert_eq!(registry.load_from_file(&path).unwrap(), 1);
        let rule = registry.get("watch-1").unwrap();
        assert_eq!(rule.trigger_type, TriggerType::FileWatch);
        assert_eq!(rule.config_str("pattern"), Some("*.txt"));
        assert_eq!(rule.risk_level, RiskLevel::High);
        assert!(registry.enabled_rules().is_empty());
    }

    #[test]
    fn risk_level_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(
            &path,
            r#"{"rules": [
                {"rule_id": "a", "name": "a", "trigger_type": "schedule", "action_command": "sys info", "risk_level": "HIGH"},
                {"rule_id": "b", "name": "b", "trigger_type": "schedule", "action_command": "sys info", "risk_level": " Critical "}
            ]}"#,
        )
        .unwrap();

        let mut registry = RuleRegistry::default();
        assert_eq!(registry.load_from_file(&path).unwrap(), 2);
        assert_eq!(registry.get("a").unwrap().risk_level, RiskLevel::High);
        assert_eq!(registry.get("b").unwrap().risk_level, RiskLevel::Critical);
    }

    #[test]
    fn unknown_risk_level_fails_to_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.yaml");
        fs::write(
            &path,
            "rules:\n  - rule_id: a\n    name: a\n    trigger_type: schedule\n    action_command: sys info\n    risk_level: extreme\n",
        )
        .unwrap();
        assert!(RuleRegistry::default().load_from_file(&path).is_err());
    }

    #[test]
    fn empty_yaml_is_no_rules() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.yaml");
        fs::write(&path, "").unwrap();
        assert_eq!(RuleRegistry::default().load_from_file(&path).unwrap(), 0);
    }

    #[test]
    fn unknown_extension_is_a_typed_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.toml");
        fs::write(&path, "").unwrap();
        let err = RuleRegistry::default().load_from_file(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RuleError>(),
            Some(RuleError::UnsupportedFormat { extension }) if extension == "toml"
        ));
    }

    #[test]
    fn unknown_trigger_type_still_loads() {
        let rule: TriggerActionRule = serde_json::from_str(
            r#"{"rule_id": "x", "name": "x", "trigger_type": "webhook", "action_command": "sys info"}"#,
        )
        .unwrap();
        assert_eq!(rule.trigger_type, TriggerType::Unknown);
    }

    #[test]
    fn register_replaces_in_place_and_toggle() {
        let mut registry = RuleRegistry::default();
        registry.register(TriggerActionRule::schedule("a", "first", 60, "sys info"));
        registry.register(TriggerActionRule::schedule("b", "second", 60, "sys info"));
        registry.register(TriggerActionRule::schedule("a", "renamed", 30, "open vscode"));

        let names: Vec<&str> = registry.rules().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["renamed", "second"]);

        assert!(registry.set_enabled("b", false));
        assert!(!registry.set_enabled("missing", false));
        let enabled: Vec<String> = registry.enabled_rules().into_iter().map(|r| r.rule_id).collect();
        assert_eq!(enabled, vec!["a".to_string()]);
    }
}
