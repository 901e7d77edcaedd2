//! Ordered execution of an already-planned command list.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use kendali_tools::RiskLevel;

use crate::result::Status;

/// Keywords whose commands only read state.
const PARALLEL_ELIGIBLE: &[&str] = &["search", "sys", "capability", "net"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    Guarded,
    ParallelEligible,
    Chain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiCommandItem {
    pub command: String,
    pub risk_level: RiskLevel,
    pub execution_mode: ExecutionMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReport {
    pub command: String,
    pub risk_level: RiskLevel,
    pub execution_mode: ExecutionMode,
    pub status: Status,
    pub duration_ms: f64,
    pub message: String,
}

/// Runs one command and reports its outcome.
#[async_trait]
pub trait CommandRunner: Send {
    async fn run(&mut self, command: &str) -> (Status, String);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MultiCommandExecutor;

impl MultiCommandExecutor {
    /// Classify each non-blank command.  Elevated risk is always guarded.
    pub fn bundle<S, F>(&self, commands: &[S], risk_level: F) -> Vec<MultiCommandItem>
    where
        S: AsRef<str>,
        F: Fn(&str) -> RiskLevel,
    {
        commands
            .iter()
            .map(|c| c.as_ref().trim())
            .filter(|c| !c.is_empty())
            .map(|command| {
                let keyword = command
                    .split_whitespace()
                    .next()
                    .map(str::to_lowercase)
                    .unwrap_or_default();
                let risk = risk_level(&keyword);
                let execution_mode = if risk.is_elevated() {
                    ExecutionMode::Guarded
                } else if PARALLEL_ELIGIBLE.contains(&keyword.as_str()) {
                    ExecutionMode::ParallelEligible
                } else {
                    ExecutionMode::Chain
                };
                MultiCommandItem {
                    command: command.to_string(),
                    risk_level: risk,
                    execution_mode,
                }
            })
            .collect()
    }

    /// Strictly sequential; every item produces exactly one report.
    pub async fn execute(&self, items: &[MultiCommandItem], runner: &mut dyn CommandRunner) -> Vec<CommandReport> {
        let mut reports = Vec::with_capacity(items.len());
        for item in items {
            let started = Instant::now();
            let (status, message) = runner.run(&item.command).await;
            let duration_ms = round2(started.elapsed().as_secs_f64() * 1000.0);
            debug!(command = %item.command, %status, duration_ms, "bundle item finished");
            reports.push(CommandReport {
                command: item.command.clone(),
                risk_level: item.risk_level,
                execution_mode: item.execution_mode,
                status,
                duration_ms,
                message,
            });
        }
        reports
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
