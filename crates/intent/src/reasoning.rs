//! Per-step execute / fallback / pruned decisions over an intent graph.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use kendali_tools::RiskLevel;

use crate::embedding::Embedder;
use crate::graph::IntentGraph;

static CONFIDENCE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"confidence=([0-9.]+)").expect("confidence marker is a valid regex"));

const DEFAULT_CONFIDENCE: f64 = 0.5;
const EMBEDDING_BONUS: f64 = 0.05;
const EMBEDDING_PENALTY: f64 = 0.08;
/// Elevated-risk steps below this are dropped outright.
const PRUNE_BELOW: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionMode {
    Execute,
    /// Run as `explain <command>` instead.
    Fallback,
    Pruned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningDecision {
    pub step_id: String,
    pub command: String,
    pub confidence: f64,
    pub mode: DecisionMode,
    pub risk_level: RiskLevel,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningPlan {
    pub overall_confidence: f64,
    pub decisions: Vec<ReasoningDecision>,
    pub fallback_used: bool,
}

impl ReasoningPlan {
    /// Commands that should actually be run, in order.
    pub fn runnable_commands(&self) -> Vec<String> {
        self.decisions
            .iter()
            .filter(|d| d.mode != DecisionMode::Pruned)
            .map(|d| d.command.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ReasoningEngine {
    pub min_confidence: f64,
}

impl Default for ReasoningEngine {
    fn default() -> Self {
        Self { min_confidence: 0.45 }
    }
}

impl ReasoningEngine {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    pub async fn build_plan(
        &self,
        graph: &IntentGraph,
        embedder: &dyn Embedder,
        risk_level: &(dyn Fn(&str) -> RiskLevel + Sync),
    ) -> ReasoningPlan {
        let mut decisions = Vec::with_capacity(graph.steps.len());
        let mut fallback_used = false;
        let mut confidence_total = 0.0;

        for step in &graph.steps {
            let mut command = step.resolved_command.trim().to_string();
            let keyword = command
                .split_whitespace()
                .next()
                .map(str::to_lowercase)
                .unwrap_or_else(|| "open".to_string());
            let level = risk_level(&keyword);

            let embedding = match embedder.embed(&command).await {
                Ok(vector) => vector,
                Err(err) => {
                    warn!(step = %step.step_id, %err, "embedding lookup failed");
                    Vec::new()
                }
            };
            let confidence = apply_embedding_signal(extract_confidence(&step.reason), &embedding);

            let mut mode = DecisionMode::Execute;
            let mut reason = "confidence above threshold";
            if confidence < self.min_confidence {
                mode = DecisionMode::Fallback;
                fallback_used = true;
                reason = "low confidence, falling back to explain";
                command = if command.is_empty() {
                    "explain".to_string()
                } else {
                    format!("explain {command}")
                };
            }
            if level.is_elevated() && confidence < PRUNE_BELOW {
                mode = DecisionMode::Pruned;
                reason = "elevated-risk step pruned for low confidence";
            }

            debug!(step = %step.step_id, ?mode, confidence, risk = %level, "reasoning decision");
            confidence_total += confidence;
            decisions.push(ReasoningDecision {
                step_id: step.step_id.clone(),
                command,
                confidence,
                mode,
                risk_level: level,
                reason: reason.to_string(),
            });
        }

        let overall_confidence = if decisions.is_empty() {
            0.0
        } else {
            confidence_total / decisions.len() as f64
        };
        ReasoningPlan {
            overall_confidence,
            decisions,
            fallback_used,
        }
    }
}

/// The number after `confidence=` in a planner trace, clamped to `[0, 1]`.
fn extract_confidence(reason: &str) -> f64 {
    CONFIDENCE_MARKER
        .captures(reason)
        .and_then(|c| c[1].trim_end_matches('.').parse::<f64>().ok())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_CONFIDENCE)
}

fn apply_embedding_signal(confidence: f64, embedding: &[f32]) -> f64 {
    if embedding.is_empty() {
        (confidence - EMBEDDING_PENALTY).max(0.0)
    } else {
        (confidence + EMBEDDING_BONUS).min(1.0)
    }
}
