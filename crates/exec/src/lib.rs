//! Policy layer between a parsed command and its handler.
//!
//! Each gate is a plain value built from [`AppConfig`]; the router consults
//! them in a fixed order and none of them touch the system.

pub mod guard;
pub mod guardrail;
pub mod profile;
pub mod safe_mode;

use std::collections::BTreeSet;

pub use guard::{SecurityGuard, expand_path, expand_path_with, resolve_path};
pub use guardrail::{CapabilityGuardrail, GuardrailDecision};
pub use profile::{ExecutionProfilePolicy, ProfileDecision, ProfileMode};
pub use safe_mode::{SafeModeDecision, SafeModePolicy};

use kendali_config::AppConfig;

// ── Policy Stack ─────────────────────────────────────────────────────────────

/// Every static gate, built once from configuration.
///
/// The execution profile is per-session state, so the stack only carries the
/// template new sessions start from.
#[derive(Debug, Clone)]
pub struct PolicyStack {
    pub guard: SecurityGuard,
    pub safe_mode: SafeModePolicy,
    pub guardrail: CapabilityGuardrail,
    pub profile_template: ExecutionProfilePolicy,
}

impl PolicyStack {
    pub fn from_config(config: &AppConfig, command_whitelist: BTreeSet<String>) -> Self {
        Self {
            guard: SecurityGuard::from_config(&config.security, command_whitelist),
            safe_mode: SafeModePolicy::from_config(&config.safe_mode),
            guardrail: CapabilityGuardrail::from_config(&config.guardrail),
            profile_template: ExecutionProfilePolicy::from_config(
                config.router.default_profile,
                &config.profiles,
            ),
        }
    }
}
