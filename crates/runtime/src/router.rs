//! The command router: free text in, one [`CommandResult`] out.
//!
//! Gate order for a single command:
//!
//! ```text
//! empty / length → intent resolution → shortcut normalization → parse
//!   → autocorrect (unknown keyword) → whitelist → execution profile
//!   → contract → target guard → safe mode / confirmation → dispatch
//! ```
//!
//! The router itself is immutable and shareable; every piece of mutable state
//! (pending slot, active profile, log) lives in the [`Session`] passed in.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use kendali_config::AppConfig;
use kendali_exec::{PolicyStack, ProfileMode};
use kendali_intent::{
    CachedHealth, Embedder, EmbeddingHealth, IntentGraph, IntentGraphPlanner, IntentResolution, IntentResolver, NoEmbedder, ReasoningEngine,
    ReasoningPlan, RetrievalOptimizer, SmartAssist, normalize_shortcuts,
};
use kendali_tools::{
    CapabilityExecutor, CommandPlugin, ContractRegistry, ParsedCommand, RegistryError, TargetKind, default_plugins,
};

use crate::handlers::{CommandHandler, HandlerCall, HandlerReply, HandlerSet};
use crate::multi::{CommandReport, CommandRunner, MultiCommandExecutor, MultiCommandItem};
use crate::result::{CommandResult, ErrorCode, Status};
use crate::session::{INTENT_RESOLVED, PendingConfirmation, Session};

pub type RouterFuture<'a> = Pin<Box<dyn Future<Output = CommandResult> + Send + 'a>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Run every gate but never dispatch.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiStepReport {
    pub graph: IntentGraph,
    pub plan: ReasoningPlan,
    pub bundles: Vec<MultiCommandItem>,
    pub reports: Vec<CommandReport>,
}

// ── Builder ──────────────────────────────────────────────────────────────────

pub struct CommandRouterBuilder {
    config: AppConfig,
    plugins: Vec<Box<dyn CommandPlugin>>,
    handlers: HandlerSet,
    capabilities: Arc<dyn CapabilityExecutor>,
    embedder: Arc<dyn Embedder>,
}

impl CommandRouterBuilder {
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn plugins(mut self, plugins: Vec<Box<dyn CommandPlugin>>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn handlers(mut self, handlers: HandlerSet) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Build the contract registry and bind every keyword to its handler.
    /// Duplicate keywords and handler names without an implementation are
    /// both startup errors.
    pub fn build(self) -> Result<CommandRouter, RegistryError> {
        let registry = ContractRegistry::from_plugins(&self.plugins)?;

        let mut bindings = HashMap::new();
        for contract in registry.contracts() {
            let Some(handler) = self.handlers.get(&contract.handler_name) else {
                warn!(keyword = %contract.keyword, handler = %contract.handler_name, "unresolved command handler");
                return Err(RegistryError::UnknownHandler {
                    keyword: contract.keyword.clone(),
                    handler: contract.handler_name.clone(),
                });
            };
            bindings.insert(contract.keyword.clone(), handler);
        }

        let policy = PolicyStack::from_config(&self.config, registry.keywords());
        info!(
            commands = registry.keywords().len(),
            dangerous = registry.dangerous_keywords().len(),
            "command router ready"
        );

        Ok(CommandRouter {
            resolver: IntentResolver::new(self.config.assist.app_aliases.clone()),
            assist: SmartAssist::from_config(&self.config.assist),
            planner: IntentGraphPlanner::new(),
            reasoning: ReasoningEngine::new(self.config.reasoning.min_confidence),
            multi: MultiCommandExecutor,
            registry,
            bindings,
            policy,
            capabilities: self.capabilities,
            embedding: CachedHealth::new(
                self.embedder,
                Duration::from_secs(self.config.embedding.health_ttl_secs),
            ),
            config: self.config,
        })
    }
}

// ── Router ───────────────────────────────────────────────────────────────────

pub struct CommandRouter {
    registry: ContractRegistry,
    bindings: HashMap<String, Arc<dyn CommandHandler>>,
    policy: PolicyStack,
    resolver: IntentResolver,
    assist: SmartAssist,
    planner: IntentGraphPlanner,
    reasoning: ReasoningEngine,
    multi: MultiCommandExecutor,
    capabilities: Arc<dyn CapabilityExecutor>,
    embedding: CachedHealth<Arc<dyn Embedder>>,
    config: AppConfig,
}

impl CommandRouter {
    /// Defaults: built-in plugins and handlers, default config, no embedder.
    pub fn builder(capabilities: Arc<dyn CapabilityExecutor>) -> CommandRouterBuilder {
        CommandRouterBuilder {
            config: AppConfig::default(),
            plugins: default_plugins(),
            handlers: HandlerSet::builtin(),
            capabilities,
            embedder: Arc::new(NoEmbedder),
        }
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &PolicyStack {
        &self.policy
    }

    pub fn assist(&self) -> &SmartAssist {
        &self.assist
    }

    pub fn capabilities(&self) -> &dyn CapabilityExecutor {
        self.capabilities.as_ref()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Embedding backend health, re-probed at most once per
    /// `embedding.health_ttl_secs`.
    pub async fn embedding_health(&self) -> EmbeddingHealth {
        self.embedding.health().await
    }

    pub fn embedding_health_ttl(&self) -> Duration {
        self.embedding.ttl()
    }

    /// A fresh session seeded from the router's configuration.
    pub fn new_session(&self) -> Session {
        Session::new(
            self.config.router.session_name.clone(),
            self.config.router.user.clone(),
            self.config.router.safe_mode,
            self.policy.profile_template.clone(),
            RetrievalOptimizer::from_config(&self.config.retrieval),
        )
    }

    pub fn resolve(&self, text: &str) -> IntentResolution {
        self.resolver.resolve(text, &self.registry.keywords())
    }

    pub fn execute<'a>(&'a self, session: &'a mut Session, text: &'a str) -> RouterFuture<'a> {
        self.execute_with(session, text, RunOptions::default())
    }

    pub fn execute_with<'a>(&'a self, session: &'a mut Session, text: &'a str, opts: RunOptions) -> RouterFuture<'a> {
        Box::pin(self.process(session, text, opts))
    }

    /// Resolve the pending slot.  The slot is always cleared; rejecting never
    /// reaches a handler.
    pub async fn confirm_pending(&self, session: &mut Session, approved: bool) -> CommandResult {
        self.confirm_pending_with(session, approved, RunOptions::default()).await
    }

    pub async fn confirm_pending_with(&self, session: &mut Session, approved: bool, opts: RunOptions) -> CommandResult {
        let Some(pending) = session.take_pending() else {
            let result = CommandResult::invalid("No action is awaiting confirmation.", ErrorCode::ContractInvalid);
            return finish(session, "<confirm>", result);
        };

        if !approved {
            info!(command = pending.display_text(), "pending action cancelled");
            let result = CommandResult::cancelled("Action cancelled by user.");
            return finish(session, pending.display_text(), result);
        }

        match pending {
            PendingConfirmation::Correction(fix) => {
                info!(corrected = %fix.corrected, "autocorrection approved");
                self.execute_with(session, &fix.corrected, opts).await
            }
            PendingConfirmation::Command(parsed) => {
                info!(keyword = %parsed.keyword, "pending action approved");
                let result = match self.recheck_approved(session, &parsed) {
                    Some(rejected) => rejected,
                    None => self.dispatch(session, &parsed, true, opts).await,
                };
                finish(session, &parsed.raw, result)
            }
        }
    }

    /// Plan `raw` as a chain of steps, reason over it, then run the surviving
    /// commands one after another through the normal pipeline.
    pub async fn run_multi_step(&self, session: &mut Session, raw: &str) -> MultiStepReport {
        let graph = self.plan_graph(session, raw);
        let plan = {
            let profile = &session.profile;
            let risk = |keyword: &str| profile.risk_level(keyword);
            self.reasoning.build_plan(&graph, self.embedding.embedder().as_ref(), &risk).await
        };

        let commands = RetrievalOptimizer::reduce_redundant_patterns(&plan.runnable_commands());
        let bundles = self.multi.bundle(commands.as_slice(), |keyword| session.profile.risk_level(keyword));
        let mut runner = RouterRunner { router: self, session };
        let reports = self.multi.execute(&bundles, &mut runner).await;

        MultiStepReport {
            graph,
            plan,
            bundles,
            reports,
        }
    }

    /// Intent graph for `raw`, cached per normalized query in the session.
    pub fn plan_graph(&self, session: &mut Session, raw: &str) -> IntentGraph {
        let key = format!("graph:{}", RetrievalOptimizer::optimize_query(raw));
        if let Some(graph) = session
            .retrieval
            .cache
            .get(&key)
            .and_then(|v| serde_json::from_value::<IntentGraph>(v).ok())
        {
            debug!(key = %key, "intent graph served from cache");
            return graph;
        }

        let allowed = self.registry.keywords();
        let graph = self
            .planner
            .build(raw, |segment| self.resolver.resolve(segment, &allowed));
        if let Ok(value) = serde_json::to_value(&graph) {
            session.retrieval.cache.insert(key, value);
        }
        graph
    }

    // ── Pipeline ─────────────────────────────────────────────────────────────

    async fn process(&self, session: &mut Session, text: &str, opts: RunOptions) -> CommandResult {
        let input = text.trim();
        if input.is_empty() {
            let result = CommandResult::invalid("Empty command. Type a command first.", ErrorCode::EmptyCommand);
            return finish(session, text, result);
        }
        let max = self.config.router.max_command_length;
        if input.chars().count() > max {
            let result = CommandResult::invalid(
                format!("Command too long. The limit is {max} characters."),
                ErrorCode::CommandTooLong,
            );
            return finish(session, input, result);
        }

        let resolution = self.resolve(input);
        if resolution.is_semantic() {
            info!(input, resolved = %resolution.resolved, confidence = resolution.confidence, "intent resolved");
            session.record(
                input,
                &format!(
                    "Intent resolved -> {} (confidence={:.2})",
                    resolution.resolved, resolution.confidence
                ),
                INTENT_RESOLVED,
            );
        }

        let Some(mut parsed) = ParsedCommand::parse(&normalize_shortcuts(&resolution.resolved)) else {
            let result = CommandResult::invalid("Empty command. Type a command first.", ErrorCode::EmptyCommand);
            return finish(session, input, result);
        };

        if self.registry.get(&parsed.keyword).is_none() {
            match self.autocorrect(session, &parsed, opts) {
                Ok(corrected) => parsed = corrected,
                Err(result) => return finish(session, &parsed.raw, result),
            }
        }

        let keyword = parsed.keyword.clone();
        if !self.policy.guard.is_command_allowed(&keyword) {
            debug!(keyword = %keyword, "rejected by whitelist");
            let result =
                CommandResult::blocked("Command rejected by the command whitelist policy.", ErrorCode::CommandBlocked);
            return finish(session, &parsed.raw, result);
        }

        let decision = session.profile.evaluate(&keyword);
        match decision.mode {
            ProfileMode::Explain => {
                info!(keyword = %keyword, profile = %session.profile.profile(), "explained instead of executed");
                let result = CommandResult::success(format!(
                    "{} Not executed: {}.",
                    self.assist.explain(&parsed.raw),
                    decision.reason
                ));
                return finish(session, &parsed.raw, result);
            }
            ProfileMode::Blocked => {
                info!(keyword = %keyword, profile = %session.profile.profile(), "blocked by execution profile");
                let result = CommandResult::blocked(
                    format!("Blocked by execution profile {}: {}.", session.profile.profile(), decision.reason),
                    ErrorCode::CommandBlocked,
                );
                return finish(session, &parsed.raw, result);
            }
            ProfileMode::Allow => {}
        }

        if let Err(violation) = self.registry.validate(&keyword, &parsed.args) {
            let result = CommandResult::invalid(violation.to_string(), ErrorCode::ContractInvalid);
            return finish(session, &parsed.raw, result);
        }

        if let Some(reason) = self.target_violation(&parsed) {
            warn!(keyword = %keyword, target = %parsed.joined_args(), "target rejected by security guard");
            let result = CommandResult::blocked(reason, ErrorCode::CommandBlocked);
            return finish(session, &parsed.raw, result);
        }

        if self.policy.safe_mode.is_blocked(&keyword) {
            info!(keyword = %keyword, "blocked by safe mode policy");
            let result = CommandResult::blocked("Action rejected by safe mode policy.", ErrorCode::SafeModeBlocked);
            return finish(session, &parsed.raw, result);
        }

        let safe_mode_confirm = session.safe_mode
            && self.registry.is_dangerous(&keyword)
            && self.policy.safe_mode.requires_confirmation(&keyword);
        if safe_mode_confirm || decision.requires_confirmation {
            let reason = if safe_mode_confirm {
                "Safe mode is on. This action needs manual confirmation.".to_string()
            } else {
                format!("Profile {}: {}.", session.profile.profile(), decision.reason)
            };
            let result = if opts.dry_run {
                CommandResult {
                    requires_confirmation: true,
                    ..CommandResult::success(format!("Dry run: '{}' would wait for confirmation. {reason}", parsed.raw))
                }
            } else {
                park(session, parsed.clone(), reason)
            };
            return finish(session, &parsed.raw, result);
        }

        let result = self.dispatch(session, &parsed, false, opts).await;
        finish(session, &parsed.raw, result)
    }

    /// `Ok` with the reparsed command when the correction is auto-applied,
    /// otherwise the result to return.
    fn autocorrect(
        &self,
        session: &mut Session,
        parsed: &ParsedCommand,
        opts: RunOptions,
    ) -> Result<ParsedCommand, CommandResult> {
        let keywords = self.registry.registration_order().iter().map(String::as_str);
        let Some(fix) = self.assist.autocorrect(&parsed.raw, keywords) else {
            let violation = self
                .registry
                .validate(&parsed.keyword, &parsed.args)
                .err()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "Unknown command.".to_string());
            return Err(CommandResult::invalid(violation, ErrorCode::ContractInvalid));
        };

        if fix.requires_confirmation {
            info!(from = %parsed.keyword, to = %fix.corrected, confidence = fix.confidence, "autocorrect needs confirmation");
            let message = format!(
                "Unknown command '{}'. Did you mean '{}'? Confirm to run it.",
                parsed.keyword, fix.corrected
            );
            if opts.dry_run {
                return Err(CommandResult {
                    requires_confirmation: true,
                    pending_command: Some(fix.corrected),
                    ..CommandResult::success(format!("Dry run: {message}"))
                });
            }
            return Err(park_correction(session, fix, message));
        }

        info!(from = %parsed.keyword, to = %fix.corrected, confidence = fix.confidence, "autocorrect applied");
        session.record(
            &parsed.raw,
            &format!("Autocorrected -> {} (confidence={:.2})", fix.corrected, fix.confidence),
            INTENT_RESOLVED,
        );
        ParsedCommand::parse(&normalize_shortcuts(&fix.corrected))
            .ok_or_else(|| CommandResult::invalid("Empty command. Type a command first.", ErrorCode::EmptyCommand))
    }

    /// Path or process guard for commands that declare a target.
    fn target_violation(&self, parsed: &ParsedCommand) -> Option<String> {
        let contract = self.registry.get(&parsed.keyword)?;
        let target = parsed.joined_args();
        match contract.target {
            TargetKind::Path if !self.policy.guard.is_path_allowed(&target) => Some(format!(
                "'{}' rejected by the path restriction policy: '{target}' is outside every allowed root.",
                parsed.keyword
            )),
            TargetKind::Process if !self.policy.guard.is_process_target_allowed(&target) => Some(format!(
                "'{}' rejected by the process protection guard: '{target}' is protected.",
                parsed.keyword
            )),
            _ => None,
        }
    }

    /// Gates that may have changed between parking and approval.
    fn recheck_approved(&self, session: &Session, parsed: &ParsedCommand) -> Option<CommandResult> {
        if self.policy.safe_mode.is_blocked(&parsed.keyword) {
            return Some(CommandResult::blocked(
                "Action rejected by safe mode policy.",
                ErrorCode::SafeModeBlocked,
            ));
        }
        let decision = session.profile.evaluate(&parsed.keyword);
        if decision.mode != ProfileMode::Allow {
            return Some(CommandResult::blocked(
                format!("Blocked by execution profile {}: {}.", session.profile.profile(), decision.reason),
                ErrorCode::CommandBlocked,
            ));
        }
        self.target_violation(parsed)
            .map(|reason| CommandResult::blocked(reason, ErrorCode::CommandBlocked))
    }

    async fn dispatch(
        &self,
        session: &mut Session,
        parsed: &ParsedCommand,
        confirmed: bool,
        opts: RunOptions,
    ) -> CommandResult {
        if opts.dry_run {
            return CommandResult::success(format!(
                "Dry run: '{}' passed every policy gate; nothing was executed.",
                parsed.raw
            ));
        }
        let Some(handler) = self.bindings.get(&parsed.keyword).cloned() else {
            return CommandResult::invalid(
                format!("No handler is bound to '{}'.", parsed.keyword),
                ErrorCode::UnknownHandler,
            );
        };

        info!(keyword = %parsed.keyword, confirmed, "dispatching command");
        let call = HandlerCall {
            router: self,
            session: &mut *session,
            command: parsed,
            confirmed,
        };
        match handler.handle(call).await {
            Ok(HandlerReply::Done(message)) => CommandResult::success(message),
            Ok(HandlerReply::NeedsConfirmation(reason)) => park(session, parsed.clone(), reason),
            Ok(HandlerReply::Denied(reason)) => {
                info!(keyword = %parsed.keyword, reason = %reason, "handler denied command");
                CommandResult::blocked(reason, ErrorCode::CommandBlocked)
            }
            Err(err) => {
                warn!(keyword = %parsed.keyword, error = %err, "command execution failed");
                CommandResult::failed(format!("{err:#}"))
            }
        }
    }
}

fn finish(session: &mut Session, command: &str, result: CommandResult) -> CommandResult {
    session.record(command, &result.message, result.status.as_str());
    result
}

/// A second confirmation request never replaces the one already parked.
fn busy(session: &Session) -> Option<CommandResult> {
    let existing = session.pending()?.display_text().to_string();
    Some(CommandResult {
        requires_confirmation: true,
        pending_command: Some(existing.clone()),
        ..CommandResult::blocked(
            format!("Another action is already awaiting confirmation: '{existing}'. Confirm or cancel it first."),
            ErrorCode::ConfirmationRequired,
        )
    })
}

fn park(session: &mut Session, parsed: ParsedCommand, reason: String) -> CommandResult {
    if let Some(rejected) = busy(session) {
        return rejected;
    }
    info!(keyword = %parsed.keyword, "awaiting confirmation");
    let raw = parsed.raw.clone();
    session.set_pending(PendingConfirmation::Command(parsed));
    CommandResult::pending(reason, raw)
}

fn park_correction(session: &mut Session, fix: kendali_intent::AutoCorrection, message: String) -> CommandResult {
    if let Some(rejected) = busy(session) {
        return rejected;
    }
    let corrected = fix.corrected.clone();
    session.set_pending(PendingConfirmation::Correction(fix));
    CommandResult::pending(message, corrected)
}

/// Feeds multi-step commands back through the router for one session.
struct RouterRunner<'a> {
    router: &'a CommandRouter,
    session: &'a mut Session,
}

#[async_trait]
impl CommandRunner for RouterRunner<'_> {
    async fn run(&mut self, command: &str) -> (Status, String) {
        let result = self.router.execute(self.session, command).await;
        (result.status, result.message)
    }
}
