//! Trigger-action automation driven by an external tick.
//!
//! Each cycle asks the file watcher, then the scheduler, which enabled rules
//! fired; duplicates collapse to their first occurrence.  Elevated-risk rules
//! pass through the approval hook before their command runs.

pub mod rules;
pub mod scheduler;
pub mod watcher;

use std::collections::HashSet;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use kendali_config::AutomationConfig;
use kendali_exec::expand_path;
use kendali_tools::RiskLevel;

use crate::result::Status;
use crate::router::CommandRouter;
use crate::session::Session;

pub use rules::{RuleError, RuleRegistry, TriggerActionRule, TriggerType};
pub use scheduler::SchedulerEngine;
pub use watcher::FileWatcherEngine;

// ── Clock ────────────────────────────────────────────────────────────────────

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ── Approval ─────────────────────────────────────────────────────────────────

/// Asked before an elevated-risk rule runs.  `Err` counts as a denial.
#[async_trait]
pub trait ApprovalHook: Send + Sync {
    async fn approve(&self, rule: &TriggerActionRule) -> Result<bool>;
}

/// Synchronous predicate as a hook.
pub struct FnApproval<F>(pub F);

#[async_trait]
impl<F> ApprovalHook for FnApproval<F>
where
    F: Fn(&TriggerActionRule) -> bool + Send + Sync,
{
    async fn approve(&self, rule: &TriggerActionRule) -> Result<bool> {
        Ok((self.0)(rule))
    }
}

/// What the approving side sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub rule_id: String,
    pub rule_name: String,
    pub action_command: String,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Deny,
}

pub type ApprovalSender = mpsc::Sender<(ApprovalRequest, oneshot::Sender<ApprovalDecision>)>;
pub type ApprovalReceiver = mpsc::Receiver<(ApprovalRequest, oneshot::Sender<ApprovalDecision>)>;

pub fn approval_channel() -> (ApprovalSender, ApprovalReceiver) {
    mpsc::channel(16)
}

/// Sends each request over a channel and waits for the decision on a oneshot.
pub struct ChannelApproval {
    tx: ApprovalSender,
}

impl ChannelApproval {
    pub fn new(tx: ApprovalSender) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ApprovalHook for ChannelApproval {
    async fn approve(&self, rule: &TriggerActionRule) -> Result<bool> {
        let request = ApprovalRequest {
            rule_id: rule.rule_id.clone(),
            rule_name: rule.name.clone(),
            action_command: rule.action_command.clone(),
            risk_level: rule.risk_level,
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((request, reply_tx))
            .await
            .map_err(|_| anyhow!("approval channel closed"))?;
        let decision = reply_rx.await.map_err(|_| anyhow!("approval reply dropped"))?;
        Ok(decision == ApprovalDecision::Approve)
    }
}

// ── Actions ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub message: String,
    pub ok: bool,
    pub requires_confirmation: bool,
}

impl ActionOutcome {
    /// Plain text result; only error-like wording marks it failed.
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ok: true,
            requires_confirmation: false,
        }
    }
}

/// Runs a rule's action command.
#[async_trait]
pub trait ActionRunner: Send {
    async fn run(&mut self, command: &str) -> Result<ActionOutcome>;
}

/// Routes actions through the full command pipeline of one session.
pub struct RouterActionRunner<'a> {
    router: &'a CommandRouter,
    session: &'a mut Session,
}

impl<'a> RouterActionRunner<'a> {
    pub fn new(router: &'a CommandRouter, session: &'a mut Session) -> Self {
        Self { router, session }
    }
}

#[async_trait]
impl ActionRunner for RouterActionRunner<'_> {
    async fn run(&mut self, command: &str) -> Result<ActionOutcome> {
        let result = self.router.execute(self.session, command).await;
        Ok(ActionOutcome {
            ok: result.ok || result.status == Status::PendingConfirmation,
            requires_confirmation: result.requires_confirmation,
            message: result.message,
        })
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationExecution {
    pub rule_id: String,
    pub rule_name: String,
    pub action_command: String,
    pub status: Status,
    pub message: String,
    pub executed_at: String,
}

const ERROR_MARKERS: &[&str] = &["blocked", "error", "denied", "ditolak"];

pub struct AutomationEngine {
    registry: RuleRegistry,
    scheduler: SchedulerEngine,
    watcher: FileWatcherEngine,
    approval: Option<Box<dyn ApprovalHook>>,
    clock: Box<dyn Clock>,
}

impl AutomationEngine {
    pub fn new(registry: RuleRegistry) -> Self {
        Self {
            registry,
            scheduler: SchedulerEngine::default(),
            watcher: FileWatcherEngine::default(),
            approval: None,
            clock: Box::new(SystemClock),
        }
    }

    /// Engine over the configured rule file; no file means no rules.
    pub fn from_config(config: &AutomationConfig) -> Result<Self> {
        let mut registry = RuleRegistry::default();
        if let Some(path) = &config.rules_path {
            registry.load_from_file(&expand_path(path))?;
        }
        Ok(Self::new(registry))
    }

    pub fn with_approval(mut self, hook: impl ApprovalHook + 'static) -> Self {
        self.approval = Some(Box::new(hook));
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RuleRegistry {
        &mut self.registry
    }

    /// One cycle at the injected clock's current time.
    pub async fn tick(&mut self, runner: &mut dyn ActionRunner) -> Vec<AutomationExecution> {
        let now = self.clock.now();
        self.run_cycle(now, runner).await
    }

    pub async fn run_cycle(&mut self, now: DateTime<Utc>, runner: &mut dyn ActionRunner) -> Vec<AutomationExecution> {
        let active = self.registry.enabled_rules();
        let mut fired = self.watcher.triggered_rules(&active);
        fired.extend(self.scheduler.triggered_rules(&active, now));

        let mut seen = HashSet::new();
        fired.retain(|id| seen.insert(id.clone()));

        let mut executions = Vec::with_capacity(fired.len());
        for rule_id in fired {
            let Some(rule) = self.registry.get(&rule_id).cloned() else {
                continue;
            };
            executions.push(self.run_rule(&rule, now, runner).await);
        }
        executions
    }

    async fn run_rule(
        &self,
        rule: &TriggerActionRule,
        now: DateTime<Utc>,
        runner: &mut dyn ActionRunner,
    ) -> AutomationExecution {
        let execution = |status, message: String| AutomationExecution {
            rule_id: rule.rule_id.clone(),
            rule_name: rule.name.clone(),
            action_command: rule.action_command.clone(),
            status,
            message,
            executed_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        };

        if rule.risk_level.is_elevated() && !self.approved(rule).await {
            info!(rule_id = %rule.rule_id, "automation rule blocked by approval hook");
            return execution(Status::Blocked, "Rule blocked by approval hook.".to_string());
        }

        info!(rule_id = %rule.rule_id, command = %rule.action_command, "automation rule fired");
        match runner.run(&rule.action_command).await {
            Ok(outcome) => {
                let status = normalize(&outcome);
                execution(status, outcome.message)
            }
            Err(err) => {
                warn!(rule_id = %rule.rule_id, error = %err, "automation action failed");
                execution(Status::Failed, format!("{err:#}"))
            }
        }
    }

    /// No hook approves.
    async fn approved(&self, rule: &TriggerActionRule) -> bool {
        let Some(hook) = &self.approval else {
            return true;
        };
        match hook.approve(rule).await {
            Ok(approved) => approved,
            Err(err) => {
                warn!(rule_id = %rule.rule_id, error = %err, "approval hook failed");
                false
            }
        }
    }
}

fn normalize(outcome: &ActionOutcome) -> Status {
    if outcome.requires_confirmation {
        return Status::PendingConfirmation;
    }
    let lowered = outcome.message.to_lowercase();
    if !outcome.ok || ERROR_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Status::Failed;
    }
    Status::Success
}
