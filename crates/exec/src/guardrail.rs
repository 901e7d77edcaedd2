//! Capability guardrail for direct `capability <domain> <action>` calls.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use kendali_config::{GuardrailConfig, PermissionTier};
use kendali_tools::RiskLevel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailDecision {
    pub allowed: bool,
    pub requires_confirmation: bool,
    pub reason: String,
    pub risk_level: RiskLevel,
}

impl GuardrailDecision {
    fn pass() -> Self {
        Self {
            allowed: true,
            requires_confirmation: false,
            reason: String::new(),
            risk_level: RiskLevel::Low,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapabilityGuardrail {
    pub permission_tier: PermissionTier,
    /// Lower-cased.
    pub protected_processes: BTreeSet<String>,
}

impl Default for CapabilityGuardrail {
    fn default() -> Self {
        Self::from_config(&GuardrailConfig::default())
    }
}

impl CapabilityGuardrail {
    pub fn from_config(config: &GuardrailConfig) -> Self {
        Self {
            permission_tier: config.permission_tier,
            protected_processes: config
                .protected_processes
                .iter()
                .map(|p| p.trim().to_lowercase())
                .collect(),
        }
    }

    pub fn evaluate(&self, domain: &str, action: &str, args: &[String]) -> GuardrailDecision {
        match (domain.to_lowercase().as_str(), action.to_lowercase().as_str()) {
            ("process", "terminate") => self.evaluate_terminate(args),
            ("file", "delete" | "move") => self.evaluate_destructive_file_action(),
            _ => GuardrailDecision::pass(),
        }
    }

    fn evaluate_terminate(&self, args: &[String]) -> GuardrailDecision {
        let target = args.join(" ").trim().to_lowercase();
        let deny = |reason: &str| GuardrailDecision {
            allowed: false,
            requires_confirmation: true,
            reason: reason.to_string(),
            risk_level: RiskLevel::High,
        };
        if self.protected_processes.contains(&target) {
            return deny("target process is on the protected process list");
        }
        if self.permission_tier == PermissionTier::Basic {
            return deny("permission tier basic may not terminate processes");
        }
        GuardrailDecision {
            allowed: true,
            requires_confirmation: true,
            reason: "process termination needs manual confirmation".to_string(),
            risk_level: RiskLevel::High,
        }
    }

    fn evaluate_destructive_file_action(&self) -> GuardrailDecision {
        if self.permission_tier == PermissionTier::Basic {
            return GuardrailDecision {
                allowed: false,
                requires_confirmation: true,
                reason: "permission tier basic may only preview risky file actions".to_string(),
                risk_level: RiskLevel::High,
            };
        }
        GuardrailDecision {
            allowed: true,
            requires_confirmation: true,
            reason: "risky file action needs manual confirmation".to_string(),
            risk_level: RiskLevel::High,
        }
    }
}
