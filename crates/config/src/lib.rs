use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ── Execution profile ─────────────────────────────────────────────────────────

/// Named profile deciding how risky commands are treated.
///
/// | Profile        | high risk            | critical risk        |
/// |----------------|----------------------|----------------------|
/// | `strict`       | allow + confirmation | blocked              |
/// | `balanced`     | allow + confirmation | allow + confirmation |
/// | `power`        | allow                | allow                |
/// | `explain-only` | explain              | explain              |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionProfile {
    #[default]
    Strict,
    Balanced,
    Power,
    ExplainOnly,
}

impl ExecutionProfile {
    pub const ALL: [ExecutionProfile; 4] = [
        ExecutionProfile::Strict,
        ExecutionProfile::Balanced,
        ExecutionProfile::Power,
        ExecutionProfile::ExplainOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Balanced => "balanced",
            Self::Power => "power",
            Self::ExplainOnly => "explain-only",
        }
    }
}

impl fmt::Display for ExecutionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| anyhow::anyhow!("unknown execution profile: {s}"))
    }
}

// ── Capability permission tier ────────────────────────────────────────────────

/// How much the capability guardrail trusts direct capability calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionTier {
    /// Destructive capability calls are preview-only.
    #[default]
    Basic,
    /// Destructive capability calls are allowed after confirmation.
    Admin,
}

// ── Sections ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Dangerous commands listed in `[safe_mode].require_confirmation_for`
    /// wait for an explicit confirmation while this is on.
    pub safe_mode: bool,
    pub max_command_length: usize,
    pub default_profile: ExecutionProfile,
    /// Identity recorded in every execution context.
    pub user: String,
    pub session_name: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            safe_mode: true,
            max_command_length: 300,
            default_profile: ExecutionProfile::Strict,
            user: "local".to_string(),
            session_name: "router-session".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Roots a path target must resolve into.  Empty means the home
    /// directory plus the current working directory.
    pub allowed_roots: Vec<String>,
    pub protected_process_names: Vec<String>,
    pub protected_pids: Vec<u32>,
    /// Keywords whitelisted on top of the registered contract set.
    pub extra_whitelist: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_roots: vec![],
            protected_process_names: vec![
                "system".to_string(),
                "system idle process".to_string(),
                "wininit.exe".to_string(),
                "csrss.exe".to_string(),
                "lsass.exe".to_string(),
                "services.exe".to_string(),
            ],
            protected_pids: vec![0, 4],
            extra_whitelist: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeModeConfig {
    pub require_confirmation_for: Vec<String>,
    /// Unconditionally refused.  Wins over `require_confirmation_for`.
    pub blocked_actions: Vec<String>,
}

impl Default for SafeModeConfig {
    fn default() -> Self {
        Self {
            require_confirmation_for: vec![
                "delete".to_string(),
                "kill".to_string(),
                "shutdown".to_string(),
            ],
            blocked_actions: vec![],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesConfig {
    /// `keyword = "low" | "medium" | "high" | "critical"` entries layered
    /// over the built-in risk table.
    pub risk_overrides: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    pub permission_tier: PermissionTier,
    pub protected_processes: Vec<String>,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            permission_tier: PermissionTier::Basic,
            protected_processes: vec![
                "explorer.exe".to_string(),
                "winlogon.exe".to_string(),
                "lsass.exe".to_string(),
                "csrss.exe".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    /// Below this similarity no correction is proposed at all.
    pub min_similarity: f64,
    /// At or above this similarity a correction is applied without asking.
    pub auto_apply_similarity: f64,
    /// Application aliases the intent resolver recognises after an "open" verb.
    pub app_aliases: Vec<String>,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.50,
            auto_apply_similarity: 0.92,
            app_aliases: vec![
                "vscode".to_string(),
                "chrome".to_string(),
                "notepad".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub min_confidence: f64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self { min_confidence: 0.45 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub cache_ttl_secs: u64,
    pub context_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 180,
            context_limit: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// How long a health probe result is trusted before the next read
    /// re-probes the backend.
    pub health_ttl_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { health_ttl_secs: 20 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// JSON or YAML rule file.  No file means no automation rules.
    pub rules_path: Option<String>,
    pub tick_secs: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            tick_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub router: RouterConfig,
    pub security: SecurityConfig,
    pub safe_mode: SafeModeConfig,
    pub profiles: ProfilesConfig,
    pub guardrail: GuardrailConfig,
    pub assist: AssistConfig,
    pub reasoning: ReasoningConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub automation: AutomationConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// A missing file means defaults; any other read failure is an error.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = match fs::read_to_string(path) {
            Ok(raw) => toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
        };
        config.apply_env_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// `KENDALI_PROFILE` and `KENDALI_LOG_LEVEL`, read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // An unparseable profile name is ignored rather than failing startup.
        if let Some(profile) = lookup("KENDALI_PROFILE").and_then(|v| v.parse::<ExecutionProfile>().ok()) {
            self.router.default_profile = profile;
        }
        if let Some(level) = lookup("KENDALI_LOG_LEVEL").filter(|l| !l.is_empty()) {
            self.telemetry.log_level = level;
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // ── Security-critical defaults ────────────────────────────────────────
    // Changing any of these values should be a deliberate, reviewed decision.

    #[test]
    fn security_defaults_keep_safe_mode_and_strict_profile() {
        let cfg = AppConfig::default();
        assert!(cfg.router.safe_mode, "safe_mode must default to true");
        assert_eq!(cfg.router.default_profile, ExecutionProfile::Strict);
        assert_eq!(cfg.guardrail.permission_tier, PermissionTier::Basic);
        assert_eq!(
            cfg.safe_mode.require_confirmation_for,
            vec!["delete", "kill", "shutdown"]
        );
        assert!(cfg.safe_mode.blocked_actions.is_empty());
        assert_eq!(cfg.security.protected_pids, vec![0, 4]);
        assert!(cfg.security.protected_process_names.contains(&"lsass.exe".to_string()));
    }

    #[test]
    fn functional_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.router.max_command_length, 300);
        assert!((cfg.assist.min_similarity - 0.50).abs() < f64::EPSILON);
        assert!((cfg.assist.auto_apply_similarity - 0.92).abs() < f64::EPSILON);
        assert!((cfg.reasoning.min_confidence - 0.45).abs() < f64::EPSILON);
        assert_eq!(cfg.retrieval.cache_ttl_secs, 180);
        assert_eq!(cfg.embedding.health_ttl_secs, 20);
        assert!(cfg.automation.rules_path.is_none());
        assert_eq!(cfg.telemetry.log_level, "info");
    }

    // ── load_from ──────────────────────────────────────────────────────────

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = AppConfig::load_from(dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(cfg.router.user, "local");
        assert_eq!(cfg.router.max_command_length, 300);
    }

    #[test]
    fn load_from_valid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.toml");
        fs::write(
            &path,
            r#"
[router]
safe_mode = false
default_profile = "explain-only"
user = "dina"

[security]
allowed_roots = ["/tmp/sandbox"]
protected_pids = [1]

[guardrail]
permission_tier = "admin"

[profiles.risk_overrides]
open = "medium"

[automation]
rules_path = "rules.yaml"
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert!(!cfg.router.safe_mode);
        assert_eq!(cfg.router.default_profile, ExecutionProfile::ExplainOnly);
        assert_eq!(cfg.router.user, "dina");
        assert_eq!(cfg.security.allowed_roots, vec!["/tmp/sandbox"]);
        assert_eq!(cfg.security.protected_pids, vec![1]);
        assert_eq!(cfg.guardrail.permission_tier, PermissionTier::Admin);
        assert_eq!(cfg.profiles.risk_overrides.get("open").map(String::as_str), Some("medium"));
        assert_eq!(cfg.automation.rules_path.as_deref(), Some("rules.yaml"));
        // Unspecified sections should have defaults
        assert_eq!(cfg.retrieval.cache_ttl_secs, 180);
    }

    #[test]
    fn load_from_invalid_toml_returns_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn load_from_unreadable_path_returns_error() {
        let dir = TempDir::new().unwrap();
        let err = AppConfig::load_from(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("reading"));
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub/config.toml");

        let mut cfg = AppConfig::default();
        cfg.router.default_profile = ExecutionProfile::Power;
        cfg.safe_mode.blocked_actions = vec!["shutdown".to_string()];
        cfg.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.router.default_profile, ExecutionProfile::Power);
        assert_eq!(loaded.safe_mode.blocked_actions, vec!["shutdown"]);
    }

    // ── ExecutionProfile ───────────────────────────────────────────────────

    #[test]
    fn execution_profile_parses_case_insensitively() {
        assert_eq!("Balanced".parse::<ExecutionProfile>().unwrap(), ExecutionProfile::Balanced);
        assert_eq!(" explain-only ".parse::<ExecutionProfile>().unwrap(), ExecutionProfile::ExplainOnly);
        assert!("yolo".parse::<ExecutionProfile>().is_err());
    }

    #[test]
    fn execution_profile_serde_uses_kebab_case() {
        let json = serde_json::to_string(&ExecutionProfile::ExplainOnly).unwrap();
        assert_eq!(json, "\"explain-only\"");
        let back: ExecutionProfile = serde_json::from_str("\"power\"").unwrap();
        assert_eq!(back, ExecutionProfile::Power);
    }

    // ── Env var overrides ──────────────────────────────────────────────────

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn env_profile_override_ignores_unknown_names() {
        let mut cfg = AppConfig::default();
        cfg.router.default_profile = ExecutionProfile::Balanced;

        cfg.apply_env_overrides(lookup(&[("KENDALI_PROFILE", "not-a-profile")]));
        assert_eq!(cfg.router.default_profile, ExecutionProfile::Balanced);

        cfg.apply_env_overrides(lookup(&[("KENDALI_PROFILE", "power")]));
        assert_eq!(cfg.router.default_profile, ExecutionProfile::Power);
    }

    #[test]
    fn env_log_level_override_skips_empty_values() {
        let mut cfg = AppConfig::default();
        cfg.apply_env_overrides(lookup(&[("KENDALI_LOG_LEVEL", "")]));
        assert_eq!(cfg.telemetry.log_level, "info");
        cfg.apply_env_overrides(lookup(&[("KENDALI_LOG_LEVEL", "debug")]));
        assert_eq!(cfg.telemetry.log_level, "debug");
    }
}
