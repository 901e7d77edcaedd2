use std::collections::BTreeSet;

use kendali_config::SafeModeConfig;

/// Outcome of the safe-mode gate for one keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeModeDecision {
    Blocked,
    Confirm,
    Allow,
}

/// Static per-keyword block and confirm lists.
#[derive(Debug, Clone)]
pub struct SafeModePolicy {
    pub require_confirmation_for: BTreeSet<String>,
    pub blocked_actions: BTreeSet<String>,
}

impl Default for SafeModePolicy {
    fn default() -> Self {
        Self::from_config(&SafeModeConfig::default())
    }
}

impl SafeModePolicy {
    pub fn from_config(config: &SafeModeConfig) -> Self {
        Self {
            require_confirmation_for: config
                .require_confirmation_for
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            blocked_actions: config.blocked_actions.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    pub fn requires_confirmation(&self, keyword: &str) -> bool {
        self.require_confirmation_for.contains(keyword)
    }

    pub fn is_blocked(&self, keyword: &str) -> bool {
        self.blocked_actions.contains(keyword)
    }

    /// Block wins over confirm.
    pub fn decide(&self, keyword: &str) -> SafeModeDecision {
        if self.is_blocked(keyword) {
            SafeModeDecision::Blocked
        } else if self.requires_confirmation(keyword) {
            SafeModeDecision::Confirm
        } else {
            SafeModeDecision::Allow
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(confirm: &[&str], blocked: &[&str]) -> SafeModePolicy {
        SafeModePolicy::from_config(&SafeModeConfig {
            require_confirmation_for: confirm.iter().map(|s| s.to_string()).collect(),
            blocked_actions: blocked.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn membership_checks() {
        let p = policy(&["delete"], &["shutdown"]);
        assert!(p.requires_confirmation("delete"));
        assert!(!p.requires_confirmation("kill"));
        assert!(p.is_blocked("shutdown"));
        assert!(!p.is_blocked("delete"));
    }

    #[test]
    fn block_takes_precedence_over_confirm() {
        let p = policy(&["delete", "shutdown"], &["shutdown"]);
        assert_eq!(p.decide("shutdown"), SafeModeDecision::Blocked);
        assert_eq!(p.decide("delete"), SafeModeDecision::Confirm);
        assert_eq!(p.decide("open"), SafeModeDecision::Allow);
    }

    #[test]
    fn default_confirms_every_system_action() {
        let p = SafeModePolicy::default();
        for kw in ["delete", "kill", "shutdown"] {
            assert_eq!(p.decide(kw), SafeModeDecision::Confirm);
        }
    }
}
