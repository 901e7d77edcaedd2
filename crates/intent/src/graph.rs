//! Multi-step input → linear chain of resolved steps.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::resolver::IntentResolution;

static STEP_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i);|\s+kemudian\s+|\s+lalu\s+|\s+and then\s+").expect("step separator is a valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Read,
    Analyze,
    Execute,
    Verify,
}

impl StepType {
    pub fn for_keyword(keyword: &str) -> Self {
        match keyword {
            "search" => Self::Read,
            "sys" | "smart" | "net" => Self::Analyze,
            "profile" => Self::Verify,
            _ => Self::Execute,
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Analyze => "analyze",
            Self::Execute => "execute",
            Self::Verify => "verify",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentStep {
    pub step_id: String,
    pub step_type: StepType,
    pub raw_input: String,
    pub resolved_command: String,
    pub depends_on: Vec<String>,
    /// `"<segment> -> <command> (<reason>, confidence=<c>)"`; the reasoning
    /// engine reads the confidence back out of this trace.
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentGraph {
    pub title: String,
    pub confidence: f64,
    pub steps: Vec<IntentStep>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntentGraphPlanner;

impl IntentGraphPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Split `raw` into segments, resolve each through `resolve` and chain
    /// them so step *i* depends on step *i − 1*.
    pub fn build<F>(&self, raw: &str, mut resolve: F) -> IntentGraph
    where
        F: FnMut(&str) -> IntentResolution,
    {
        let segments = split_steps(raw);
        let mut steps = Vec::with_capacity(segments.len());
        let mut confidence_total = 0.0;

        for (index, segment) in segments.iter().enumerate() {
            let resolution = resolve(segment);
            let resolved_command = resolution.resolved.trim().to_string();
            confidence_total += resolution.confidence;

            let keyword = resolved_command
                .split_whitespace()
                .next()
                .map(str::to_lowercase)
                .unwrap_or_else(|| "open".to_string());
            let depends_on = if index == 0 {
                Vec::new()
            } else {
                vec![format!("S{index}")]
            };

            steps.push(IntentStep {
                step_id: format!("S{}", index + 1),
                step_type: StepType::for_keyword(&keyword),
                raw_input: segment.clone(),
                reason: format!(
                    "{segment} -> {resolved_command} ({}, confidence={:.2})",
                    resolution.reason, resolution.confidence
                ),
                resolved_command,
                depends_on,
            });
        }

        let confidence = if steps.is_empty() {
            0.0
        } else {
            confidence_total / steps.len() as f64
        };
        IntentGraph {
            title: format!("Multi-step intent plan ({} steps)", steps.len()),
            confidence,
            steps,
        }
    }
}

fn split_steps(text: &str) -> Vec<String> {
    let clean = text.trim();
    if clean.is_empty() {
        return Vec::new();
    }
    let segments: Vec<String> = STEP_SEPARATOR
        .split(clean)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if segments.is_empty() {
        vec![clean.to_string()]
    } else {
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::IntentResolver;
    use std::collections::BTreeSet;

    fn keywords() -> BTreeSet<String> {
        ["open", "search", "sys", "profile"].iter().map(|s| s.to_string()).collect()
    }

    fn plan(raw: &str) -> IntentGraph {
        let resolver = IntentResolver::default();
        let allowed = keywords();
        IntentGraphPlanner::new().build(raw, |segment| resolver.resolve(segment, &allowed))
    }

    #[test]
    fn splits_on_every_separator() {
        let graph = plan("buka vscode lalu cari file notes.md; sys info and then profile strict");
        let commands: Vec<&str> = graph.steps.iter().map(|s| s.resolved_command.as_str()).collect();
        assert_eq!(
            commands,
            vec!["open vscode", "search file notes.md", "sys info", "profile strict"]
        );
        assert_eq!(graph.title, "Multi-step intent plan (4 steps)");
    }

    #[test]
    fn steps_form_a_linear_chain() {
        let graph = plan("open vscode kemudian sys info");
        assert_eq!(graph.steps[0].step_id, "S1");
        assert!(graph.steps[0].depends_on.is_empty());
        assert_eq!(graph.steps[1].step_id, "S2");
        assert_eq!(graph.steps[1].depends_on, vec!["S1".to_string()]);
    }

    #[test]
    fn step_types_follow_keyword() {
        let graph = plan("search file a.txt; sys info; open notepad; profile power");
        let types: Vec<StepType> = graph.steps.iter().map(|s| s.step_type).collect();
        assert_eq!(
            types,
            vec![StepType::Read, StepType::Analyze, StepType::Execute, StepType::Verify]
        );
    }

    #[test]
    fn reason_embeds_resolution_confidence() {
        let graph = plan("buka chrome");
        assert_eq!(
            graph.steps[0].reason,
            "buka chrome -> open chrome (semantic_open, confidence=0.78)"
        );
        assert!((graph.confidence - 0.78).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_mean_of_steps() {
        let graph = plan("open vscode; xyzzy");
        assert!((graph.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn blank_input_has_no_steps() {
        let graph = plan("  ");
        assert!(graph.steps.is_empty());
        assert_eq!(graph.confidence, 0.0);
        assert_eq!(graph.title, "Multi-step intent plan (0 steps)");
    }

    #[test]
    fn separator_only_input_keeps_raw_text() {
        let graph = plan(";");
        assert_eq!(graph.steps.len(), 1);
        assert_eq!(graph.steps[0].raw_input, ";");
    }
}
