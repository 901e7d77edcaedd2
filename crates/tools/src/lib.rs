use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

// ── Risk levels ──────────────────────────────────────────────────────────────

/// Risk classification for a command keyword or an automation rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// `High` and `Critical` are the levels every policy treats specially.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => anyhow::bail!("unknown risk level: {other}"),
        }
    }
}

// ── Command definitions and contracts ────────────────────────────────────────

/// What the single free-text argument of a dangerous command points at.
/// The router runs the matching security-guard check before dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    None,
    Path,
    Process,
}

/// Declarative command definition contributed by a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDefinition {
    pub keyword: String,
    pub usage: String,
    #[serde(default)]
    pub min_args: usize,
    #[serde(default)]
    pub max_args: Option<usize>,
    #[serde(default)]
    pub first_arg_equals: Option<String>,
    pub handler_name: String,
    #[serde(default)]
    pub dangerous: bool,
    #[serde(default)]
    pub target: TargetKind,
}

impl CommandDefinition {
    /// A non-dangerous definition with no argument bounds.
    pub fn new(keyword: &str, usage: &str, handler_name: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            usage: usage.to_string(),
            min_args: 0,
            max_args: None,
            first_arg_equals: None,
            handler_name: handler_name.to_string(),
            dangerous: false,
            target: TargetKind::None,
        }
    }

    pub fn min_args(mut self, n: usize) -> Self {
        self.min_args = n;
        self
    }

    pub fn max_args(mut self, n: usize) -> Self {
        self.max_args = Some(n);
        self
    }

    pub fn first_arg(mut self, literal: &str) -> Self {
        self.first_arg_equals = Some(literal.to_lowercase());
        self
    }

    pub fn dangerous(mut self, target: TargetKind) -> Self {
        self.dangerous = true;
        self.target = target;
        self
    }
}

/// Validation schema for one keyword.  Immutable once the registry is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandContract {
    pub keyword: String,
    pub usage: String,
    pub min_args: usize,
    /// `None` means unbounded.
    pub max_args: Option<usize>,
    pub first_arg_equals: Option<String>,
    pub dangerous: bool,
    pub target: TargetKind,
    pub handler_name: String,
}

impl From<&CommandDefinition> for CommandContract {
    fn from(def: &CommandDefinition) -> Self {
        Self {
            keyword: def.keyword.to_lowercase(),
            usage: def.usage.clone(),
            min_args: def.min_args,
            max_args: def.max_args,
            first_arg_equals: def.first_arg_equals.as_ref().map(|s| s.to_lowercase()),
            dangerous: def.dangerous,
            target: def.target,
            handler_name: def.handler_name.clone(),
        }
    }
}

/// One tokenized invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    /// Lower-cased first token.
    pub keyword: String,
    pub args: Vec<String>,
    /// Trimmed input text.
    pub raw: String,
}

impl ParsedCommand {
    /// Tokenize on whitespace.  Blank input yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let raw = text.trim();
        let mut tokens = raw.split_whitespace();
        let keyword = tokens.next()?.to_lowercase();
        Some(Self {
            keyword,
            args: tokens.map(str::to_string).collect(),
            raw: raw.to_string(),
        })
    }

    /// Arguments re-joined with single spaces.
    pub fn joined_args(&self) -> String {
        self.args.join(" ")
    }
}

/// Why a command failed contract validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    UnknownKeyword { known: Vec<String> },
    Usage { usage: String },
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKeyword { known } => write!(
                f,
                "Unknown command. Use one of the registered commands: {}.",
                known.join(", ")
            ),
            Self::Usage { usage } => write!(f, "Invalid format. Example: {usage}"),
        }
    }
}

// ── Plugins and registry ─────────────────────────────────────────────────────

/// A capability provider that declares the commands it contributes.
///
/// Plugins are listed explicitly at startup; nothing is discovered by
/// scanning.
pub trait CommandPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn commands(&self) -> Vec<CommandDefinition>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate plugin keyword '{keyword}' (declared by '{first}' and '{second}')")]
    DuplicateKeyword {
        keyword: String,
        first: String,
        second: String,
    },
    #[error("keyword '{keyword}' names handler '{handler}' which is not registered")]
    UnknownHandler { keyword: String, handler: String },
}

/// Keyword → contract map built once from the plugin list.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: BTreeMap<String, CommandContract>,
    order: Vec<String>,
}

impl ContractRegistry {
    /// Collect every plugin's definitions.  A keyword declared twice fails
    /// the whole build, so neither duplicate ends up registered.
    pub fn from_plugins(plugins: &[Box<dyn CommandPlugin>]) -> Result<Self, RegistryError> {
        let mut contracts = BTreeMap::new();
        let mut order = Vec::new();
        let mut owners: BTreeMap<String, String> = BTreeMap::new();

        for plugin in plugins {
            for def in plugin.commands() {
                let contract = CommandContract::from(&def);
                if let Some(first) = owners.get(&contract.keyword) {
                    warn!(
                        keyword = %contract.keyword,
                        first = %first,
                        second = plugin.name(),
                        "duplicate plugin keyword"
                    );
                    return Err(RegistryError::DuplicateKeyword {
                        keyword: contract.keyword,
                        first: first.clone(),
                        second: plugin.name().to_string(),
                    });
                }
                owners.insert(contract.keyword.clone(), plugin.name().to_string());
                order.push(contract.keyword.clone());
                contracts.insert(contract.keyword.clone(), contract);
            }
            debug!(plugin = plugin.name(), "plugin commands registered");
        }

        Ok(Self { contracts, order })
    }

    pub fn get(&self, keyword: &str) -> Option<&CommandContract> {
        self.contracts.get(keyword)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &CommandContract> {
        self.contracts.values()
    }

    /// Sorted registered keywords.
    pub fn keywords(&self) -> BTreeSet<String> {
        self.contracts.keys().cloned().collect()
    }

    /// Keywords in plugin registration order.
    pub fn registration_order(&self) -> &[String] {
        &self.order
    }

    pub fn dangerous_keywords(&self) -> BTreeSet<String> {
        self.contracts
            .values()
            .filter(|c| c.dangerous)
            .map(|c| c.keyword.clone())
            .collect()
    }

    pub fn is_dangerous(&self, keyword: &str) -> bool {
        self.contracts.get(keyword).is_some_and(|c| c.dangerous)
    }

    /// Check argument count and the required first literal.
    pub fn validate(&self, keyword: &str, args: &[String]) -> Result<(), ContractViolation> {
        let Some(contract) = self.contracts.get(keyword) else {
            return Err(ContractViolation::UnknownKeyword {
                known: self.contracts.keys().cloned().collect(),
            });
        };

        let usage = || ContractViolation::Usage {
            usage: contract.usage.clone(),
        };

        if args.len() < contract.min_args {
            return Err(usage());
        }
        if contract.max_args.is_some_and(|max| args.len() > max) {
            return Err(usage());
        }
        if let Some(expected) = &contract.first_arg_equals {
            let first = args.first().map(|a| a.to_lowercase()).unwrap_or_default();
            if &first != expected {
                return Err(usage());
            }
        }
        Ok(())
    }
}

// ── Capability executor ──────────────────────────────────────────────────────

/// The collaborator that actually touches the system.  Every result is free
/// text; failures are `Err` and surface as a `failed` status upstream.
#[async_trait]
pub trait CapabilityExecutor: Send + Sync {
    async fn execute(&self, domain: &str, action: &str, args: &[String]) -> Result<String>;
    async fn terminate(&self, target: &str) -> Result<String>;
    async fn delete(&self, target: &str) -> Result<String>;
    async fn shutdown(&self) -> Result<String>;
}

// ── Built-in plugins ─────────────────────────────────────────────────────────

pub mod builtins;
pub use builtins::{AssistPlugin, CorePlugin, SystemActionsPlugin, default_plugins};

#[cfg(test)]
mod registry_tests {
    use super::*;

    struct FixedPlugin {
        name: &'static str,
        defs: Vec<CommandDefinition>,
    }

    impl CommandPlugin for FixedPlugin {
        fn name(&self) -> &str {
            self.name
        }
        fn commands(&self) -> Vec<CommandDefinition> {
            self.defs.clone()
        }
    }

    fn registry() -> ContractRegistry {
        ContractRegistry::from_plugins(&default_plugins()).unwrap()
    }

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_lowercases_keyword_and_keeps_args() {
        let parsed = ParsedCommand::parse("  SEARCH file Data.txt ").unwrap();
        assert_eq!(parsed.keyword, "search");
        assert_eq!(parsed.args, vec!["file", "Data.txt"]);
        assert_eq!(parsed.raw, "SEARCH file Data.txt");
    }

    #[test]
    fn parse_blank_is_none() {
        assert!(ParsedCommand::parse("").is_none());
        assert!(ParsedCommand::parse("   \t ").is_none());
    }

    #[test]
    fn default_plugins_register_all_keywords() {
        let reg = registry();
        let keywords = reg.keywords();
        for kw in ["open", "search", "sys", "delete", "kill", "shutdown", "explain", "profile", "capability", "smart"] {
            assert!(keywords.contains(kw), "missing keyword {kw}");
        }
    }

    #[test]
    fn registration_order_follows_plugin_list() {
        let reg = registry();
        assert_eq!(
            reg.registration_order(),
            ["open", "search", "sys", "delete", "kill", "shutdown", "explain", "profile", "capability", "smart"]
        );
    }

    #[test]
    fn dangerous_set_is_system_actions() {
        let dangerous = registry().dangerous_keywords();
        let expected: BTreeSet<String> =
            ["delete", "kill", "shutdown"].iter().map(|s| s.to_string()).collect();
        assert_eq!(dangerous, expected);
    }

    #[test]
    fn unknown_keyword_lists_every_registered_keyword() {
        let reg = registry();
        for unknown in ["foobar", "x", "rm"] {
            let err = reg.validate(unknown, &[]).unwrap_err();
            match &err {
                ContractViolation::UnknownKeyword { known } => {
                    assert_eq!(known.len(), reg.keywords().len());
                }
                other => panic!("unexpected violation {other:?}"),
            }
            let message = err.to_string();
            for kw in reg.keywords() {
                assert!(message.contains(&kw), "{message} should list {kw}");
            }
        }
    }

    #[test]
    fn arg_bounds_and_first_literal() {
        let reg = registry();
        assert!(reg.validate("search", &args(&["file", "report.pdf"])).is_ok());
        assert!(reg.validate("search", &args(&["FILE", "report.pdf"])).is_ok());
        assert_eq!(
            reg.validate("search", &args(&["docs", "report.pdf"])),
            Err(ContractViolation::Usage { usage: "search file <query>".to_string() })
        );
        assert!(reg.validate("search", &args(&["file"])).is_err());
        assert!(reg.validate("sys", &args(&["info"])).is_ok());
        assert!(reg.validate("sys", &args(&["info", "extra"])).is_err());
        assert!(reg.validate("shutdown", &[]).is_ok());
        assert!(reg.validate("shutdown", &args(&["now"])).is_err());
        assert!(reg.validate("open", &[]).is_err());
    }

    #[test]
    fn usage_violation_message_carries_example() {
        let err = registry().validate("open", &[]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid format. Example: open <app_alias>");
    }

    #[test]
    fn duplicate_keyword_fails_the_whole_build() {
        let plugins: Vec<Box<dyn CommandPlugin>> = vec![
            Box::new(FixedPlugin {
                name: "alpha",
                defs: vec![CommandDefinition::new("ping", "ping", "ping")],
            }),
            Box::new(FixedPlugin {
                name: "beta",
                defs: vec![CommandDefinition::new("PING", "ping <host>", "ping_host")],
            }),
        ];
        let err = ContractRegistry::from_plugins(&plugins).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateKeyword {
                keyword: "ping".to_string(),
                first: "alpha".to_string(),
                second: "beta".to_string(),
            }
        );
    }

    #[test]
    fn definitions_deserialize_with_defaults() {
        let def: CommandDefinition = serde_json::from_str(
            r#"{"keyword": "ping", "usage": "ping <host>", "handler_name": "ping", "min_args": 1}"#,
        )
        .unwrap();
        assert_eq!(def.min_args, 1);
        assert!(def.max_args.is_none());
        assert!(!def.dangerous);
        assert_eq!(def.target, TargetKind::None);
    }

    #[test]
    fn risk_level_ordering_and_parsing() {
        assert!(RiskLevel::Low < RiskLevel::Critical);
        assert!(RiskLevel::High.is_elevated());
        assert!(!RiskLevel::Medium.is_elevated());
        assert_eq!("HIGH".parse::<RiskLevel>().unwrap(), RiskLevel::High);
        assert!("severe".parse::<RiskLevel>().is_err());
    }
}
