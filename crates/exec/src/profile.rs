//! Execution profile policy: keyword risk table × named profile.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use kendali_config::{ExecutionProfile, ProfilesConfig};
use kendali_tools::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileMode {
    Allow,
    /// Describe the command instead of running it.
    Explain,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDecision {
    pub mode: ProfileMode,
    pub requires_confirmation: bool,
    pub risk_level: RiskLevel,
    pub reason: String,
}

const DEFAULT_RISKS: &[(&str, RiskLevel)] = &[
    ("open", RiskLevel::Low),
    ("search", RiskLevel::Low),
    ("sys", RiskLevel::Low),
    ("explain", RiskLevel::Low),
    ("profile", RiskLevel::Low),
    ("capability", RiskLevel::Medium),
    ("smart", RiskLevel::Medium),
    ("kill", RiskLevel::High),
    ("delete", RiskLevel::High),
    ("shutdown", RiskLevel::Critical),
];

#[derive(Debug, Clone)]
pub struct ExecutionProfilePolicy {
    profile: ExecutionProfile,
    risk_map: HashMap<String, RiskLevel>,
}

impl Default for ExecutionProfilePolicy {
    fn default() -> Self {
        Self::new(ExecutionProfile::Strict)
    }
}

impl ExecutionProfilePolicy {
    pub fn new(profile: ExecutionProfile) -> Self {
        Self {
            profile,
            risk_map: DEFAULT_RISKS
                .iter()
                .map(|(k, level)| (k.to_string(), *level))
                .collect(),
        }
    }

    /// Built-in table with `[profiles].risk_overrides` layered on top.
    /// Overrides that do not name a risk level are skipped.
    pub fn from_config(profile: ExecutionProfile, config: &ProfilesConfig) -> Self {
        let mut policy = Self::new(profile);
        for (keyword, raw) in &config.risk_overrides {
            match raw.parse::<RiskLevel>() {
                Ok(level) => {
                    policy.risk_map.insert(keyword.to_lowercase(), level);
                }
                Err(err) => warn!(keyword = %keyword, %err, "ignoring risk override"),
            }
        }
        policy
    }

    pub fn profile(&self) -> ExecutionProfile {
        self.profile
    }

    /// Switch to a named profile.  Unknown names leave the current profile
    /// in place; the returned value is always the active profile.
    pub fn set_profile(&mut self, name: &str) -> ExecutionProfile {
        match name.parse::<ExecutionProfile>() {
            Ok(profile) => {
                info!(from = %self.profile, to = %profile, "execution profile changed");
                self.profile = profile;
            }
            Err(_) => warn!(requested = name, current = %self.profile, "unknown execution profile ignored"),
        }
        self.profile
    }

    /// Unmapped keywords are `low`.
    pub fn risk_level(&self, keyword: &str) -> RiskLevel {
        self.risk_map
            .get(&keyword.to_lowercase())
            .copied()
            .unwrap_or(RiskLevel::Low)
    }

    pub fn evaluate(&self, keyword: &str) -> ProfileDecision {
        let risk = self.risk_level(keyword);
        let decision = |mode, requires_confirmation, reason: &str| ProfileDecision {
            mode,
            requires_confirmation,
            risk_level: risk,
            reason: reason.to_string(),
        };

        match (self.profile, risk) {
            (ExecutionProfile::ExplainOnly, r) if r.is_elevated() => decision(
                ProfileMode::Explain,
                false,
                "explain-only profile does not execute risky commands",
            ),
            (ExecutionProfile::Strict, RiskLevel::Critical) => decision(
                ProfileMode::Blocked,
                true,
                "strict profile blocks critical commands",
            ),
            (ExecutionProfile::Strict | ExecutionProfile::Balanced, r) if r.is_elevated() => decision(
                ProfileMode::Allow,
                true,
                "profile requires manual confirmation for risky commands",
            ),
            (ExecutionProfile::Power, r) if r.is_elevated() => decision(
                ProfileMode::Allow,
                false,
                "power profile allows risky commands",
            ),
            _ => decision(ProfileMode::Allow, false, ""),
        }
    }
}
