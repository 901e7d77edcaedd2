//! Typed command handlers, bound to contracts by handler name.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use kendali_config::ExecutionProfile;
use kendali_intent::SystemIntentMapper;
use kendali_tools::ParsedCommand;

use crate::router::CommandRouter;
use crate::session::Session;

/// Everything a handler may touch for one dispatch.
pub struct HandlerCall<'a> {
    pub router: &'a CommandRouter,
    pub session: &'a mut Session,
    pub command: &'a ParsedCommand,
    /// The user already approved this exact command.
    pub confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerReply {
    Done(String),
    /// Park the command in the pending slot with this reason.
    NeedsConfirmation(String),
    /// A domain guardrail refused the call.
    Denied(String),
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, call: HandlerCall<'_>) -> Result<HandlerReply>;
}

/// Handler-name → implementation.
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl HandlerSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Implementations for every handler name the built-in plugins declare.
    pub fn builtin() -> Self {
        let mut set = Self::empty();
        set.insert("open", OpenHandler);
        set.insert("search", SearchHandler);
        set.insert("sys", SysHandler);
        set.insert("delete", DeleteHandler);
        set.insert("kill", KillHandler);
        set.insert("shutdown", ShutdownHandler);
        set.insert("explain", ExplainHandler);
        set.insert("profile", ProfileHandler);
        set.insert("capability", CapabilityHandler);
        set.insert("smart", SmartHandler);
        set
    }

    pub fn insert(&mut self, name: &str, handler: impl CommandHandler + 'static) {
        self.handlers.insert(name.to_string(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).cloned()
    }
}

// ── Core ─────────────────────────────────────────────────────────────────────

struct OpenHandler;

#[async_trait]
impl CommandHandler for OpenHandler {
    async fn handle(&self, call: HandlerCall<'_>) -> Result<HandlerReply> {
        let out = call
            .router
            .capabilities()
            .execute("app", "open", &call.command.args)
            .await?;
        Ok(HandlerReply::Done(out))
    }
}

struct SearchHandler;

#[async_trait]
impl CommandHandler for SearchHandler {
    async fn handle(&self, call: HandlerCall<'_>) -> Result<HandlerReply> {
        // args[0] is the `file` literal
        let query = call.command.args.get(1..).unwrap_or_default().join(" ");
        let out = call
            .router
            .capabilities()
            .execute("file", "search", &[query])
            .await?;
        Ok(HandlerReply::Done(out))
    }
}

struct SysHandler;

#[async_trait]
impl CommandHandler for SysHandler {
    async fn handle(&self, call: HandlerCall<'_>) -> Result<HandlerReply> {
        let out = call.router.capabilities().execute("system", "info", &[]).await?;
        Ok(HandlerReply::Done(out))
    }
}

// ── System actions ───────────────────────────────────────────────────────────

struct DeleteHandler;

#[async_trait]
impl CommandHandler for DeleteHandler {
    async fn handle(&self, call: HandlerCall<'_>) -> Result<HandlerReply> {
        let target = call.command.joined_args();
        Ok(HandlerReply::Done(call.router.capabilities().delete(&target).await?))
    }
}

struct KillHandler;

#[async_trait]
impl CommandHandler for KillHandler {
    async fn handle(&self, call: HandlerCall<'_>) -> Result<HandlerReply> {
        let target = call.command.joined_args();
        Ok(HandlerReply::Done(call.router.capabilities().terminate(&target).await?))
    }
}

struct ShutdownHandler;

#[async_trait]
impl CommandHandler for ShutdownHandler {
    async fn handle(&self, call: HandlerCall<'_>) -> Result<HandlerReply> {
        Ok(HandlerReply::Done(call.router.capabilities().shutdown().await?))
    }
}

// ── Assist ───────────────────────────────────────────────────────────────────

struct ExplainHandler;

#[async_trait]
impl CommandHandler for ExplainHandler {
    async fn handle(&self, call: HandlerCall<'_>) -> Result<HandlerReply> {
        let target = call.command.joined_args();
        let mut text = call.router.assist().explain(&target);
        if let Some(keyword) = target.split_whitespace().next() {
            let decision = call.session.profile.evaluate(keyword);
            text.push_str(&format!(
                " Risk level: {} under profile {}.",
                decision.risk_level,
                call.session.profile.profile()
            ));
        }
        Ok(HandlerReply::Done(text))
    }
}

struct ProfileHandler;

#[async_trait]
impl CommandHandler for ProfileHandler {
    async fn handle(&self, call: HandlerCall<'_>) -> Result<HandlerReply> {
        let Some(requested) = call.command.args.first() else {
            let names: Vec<&str> = ExecutionProfile::ALL.iter().map(|p| p.as_str()).collect();
            return Ok(HandlerReply::Done(format!(
                "Active profile: {}. Available: {}.",
                call.session.profile.profile(),
                names.join(", ")
            )));
        };
        let before = call.session.profile.profile();
        let active = call.session.profile.set_profile(requested);
        let message = if active.as_str() == requested.trim().to_lowercase() {
            format!("Execution profile set to {active}.")
        } else {
            format!("Unknown profile '{requested}'. Execution profile stays {before}.")
        };
        Ok(HandlerReply::Done(message))
    }
}

/// `capability <domain> <action> [args]`, gated by the capability guardrail.
struct CapabilityHandler;

#[async_trait]
impl CommandHandler for CapabilityHandler {
    async fn handle(&self, call: HandlerCall<'_>) -> Result<HandlerReply> {
        let [domain, action, rest @ ..] = call.command.args.as_slice() else {
            anyhow::bail!("capability needs a domain and an action");
        };

        let decision = call.router.policy().guardrail.evaluate(domain, action, rest);
        debug!(domain = %domain, action = %action, allowed = decision.allowed, "capability guardrail");
        if !decision.allowed {
            return Ok(HandlerReply::Denied(format!(
                "Capability call denied by guardrail: {}.",
                decision.reason
            )));
        }
        if decision.requires_confirmation && !call.confirmed {
            return Ok(HandlerReply::NeedsConfirmation(format!(
                "Capability guardrail: {}.",
                decision.reason
            )));
        }

        let out = call.router.capabilities().execute(domain, action, rest).await?;
        Ok(HandlerReply::Done(out))
    }
}

/// Free-text system request → mapped capability plan, each command routed
/// through the full pipeline.
struct SmartHandler;

#[async_trait]
impl CommandHandler for SmartHandler {
    async fn handle(&self, call: HandlerCall<'_>) -> Result<HandlerReply> {
        let request = call.command.joined_args();
        let Some(plan) = SystemIntentMapper.map_request(&request) else {
            return Ok(HandlerReply::Done(format!(
                "No system plan matches '{request}'. Try: {}",
                call.router.assist().argument_hints("smart").join(" | ")
            )));
        };
        if plan.requires_confirmation && !call.confirmed {
            return Ok(HandlerReply::NeedsConfirmation(format!(
                "{} needs confirmation before it runs: {}.",
                plan.title,
                plan.commands.join("; ")
            )));
        }

        let mut lines = vec![format!("{} ({} steps)", plan.title, plan.steps.len())];
        for step in &plan.steps {
            lines.push(format!("- {step}"));
        }
        for command in &plan.commands {
            let result = call.router.execute(call.session, command).await;
            lines.push(format!("[{}] {command}: {}", result.status, result.message));
        }
        Ok(HandlerReply::Done(lines.join("\n")))
    }
}
