//! Keyword autocorrect, argument hints and non-executing explanations.

use serde::{Deserialize, Serialize};
use tracing::debug;

use kendali_config::AssistConfig;

/// Suggested keyword substitution for an unrecognized command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoCorrection {
    pub original: String,
    pub corrected: String,
    pub confidence: f64,
    pub requires_confirmation: bool,
}

const ARGUMENT_HINTS: &[(&str, &[&str])] = &[
    ("search", &["file <query>"]),
    ("sys", &["info"]),
    (
        "capability",
        &["file list <path>", "network interface_summary", "process list", "utility time"],
    ),
    ("smart", &["check whether the network is slow", "clean up the download folder"]),
    ("open", &["vscode", "notepad", "chrome"]),
    ("profile", &["strict", "balanced", "power", "explain-only"]),
];

#[derive(Debug, Clone)]
pub struct SmartAssist {
    min_similarity: f64,
    auto_apply_similarity: f64,
}

impl Default for SmartAssist {
    fn default() -> Self {
        Self::from_config(&AssistConfig::default())
    }
}

impl SmartAssist {
    pub fn from_config(config: &AssistConfig) -> Self {
        Self {
            min_similarity: config.min_similarity,
            auto_apply_similarity: config.auto_apply_similarity,
        }
    }

    /// Propose the closest registered keyword for an unknown first token.
    /// Returns `None` for blank input, already-known keywords, or when the
    /// best match is below the similarity floor.
    pub fn autocorrect<'a, I>(&self, raw: &str, keywords: I) -> Option<AutoCorrection>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let clean = raw.trim();
        let mut tokens = clean.split_whitespace();
        let keyword = tokens.next()?.to_lowercase();

        let mut best: Option<(&str, f64)> = None;
        for candidate in keywords {
            if candidate == keyword {
                return None;
            }
            let score = similarity(&keyword, candidate);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }

        let (candidate, score) = best?;
        if score < self.min_similarity {
            return None;
        }

        let corrected = std::iter::once(candidate)
            .chain(tokens)
            .collect::<Vec<_>>()
            .join(" ");
        debug!(from = %keyword, to = candidate, score, "autocorrect candidate");
        Some(AutoCorrection {
            original: clean.to_string(),
            corrected,
            confidence: score,
            requires_confirmation: score < self.auto_apply_similarity,
        })
    }

    pub fn argument_hints(&self, raw: &str) -> &'static [&'static str] {
        let Some(first) = raw.split_whitespace().next() else {
            return &[];
        };
        hints_for(&first.to_lowercase())
    }

    pub fn explain(&self, command: &str) -> String {
        let Some(first) = command.split_whitespace().next() else {
            return "Empty command.".to_string();
        };
        let keyword = first.to_lowercase();
        let hints = hints_for(&keyword);
        if hints.is_empty() {
            format!("Explain: command '{keyword}' runs under its active contract.")
        } else {
            format!(
                "Explain: command '{keyword}' would run. Example arguments: {}",
                hints.join(" | ")
            )
        }
    }
}

fn hints_for(keyword: &str) -> &'static [&'static str] {
    ARGUMENT_HINTS
        .iter()
        .find(|(k, _)| *k == keyword)
        .map(|(_, hints)| *hints)
        .unwrap_or(&[])
}

/// `1 − distance / max(len)`, in `[0, 1]`.
pub fn similarity(left: &str, right: &str) -> f64 {
    let scale = left.chars().count().max(right.chars().count()).max(1);
    1.0 - levenshtein(left, right) as f64 / scale as f64
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYWORDS: &[&str] = &["open", "search", "sys"];

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("opne", "open"), 2);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn transposed_keyword_needs_confirmation() {
        let fix = SmartAssist::default()
            .autocorrect("opne vscode", KEYWORDS.iter().copied())
            .unwrap();
        assert!(fix.corrected.starts_with("open"));
        assert_eq!(fix.corrected, "open vscode");
        assert!((fix.confidence - 0.5).abs() < 1e-9);
        assert!(fix.requires_confirmation);
    }

    #[test]
    fn equal_scores_keep_the_first_candidate() {
        let assist = SmartAssist::default();
        let first = assist.autocorrect("sart x", ["start", "smart"]).unwrap();
        assert_eq!(first.corrected, "start x");
        let first = assist.autocorrect("sart x", ["smart", "start"]).unwrap();
        assert_eq!(first.corrected, "smart x");
    }

    #[test]
    fn near_exact_match_auto_applies() {
        // one edit over thirteen characters clears 0.92
        let keywords = ["capabilities", "search"];
        let fix = SmartAssist::default()
            .autocorrect("capabilitiess network ping", keywords.iter().copied())
            .unwrap();
        assert_eq!(fix.corrected, "capabilities network ping");
        assert!(!fix.requires_confirmation);
    }

    #[test]
    fn known_keyword_or_poor_match_yields_none() {
        let assist = SmartAssist::default();
        assert!(assist.autocorrect("open vscode", KEYWORDS.iter().copied()).is_none());
        assert!(assist.autocorrect("zzzzzzzz", KEYWORDS.iter().copied()).is_none());
        assert!(assist.autocorrect("   ", KEYWORDS.iter().copied()).is_none());
    }

    #[test]
    fn hints_and_explain() {
        let assist = SmartAssist::default();
        assert_eq!(assist.argument_hints("search"), &["file <query>"]);
        assert!(assist.argument_hints("").is_empty());
        assert!(assist.argument_hints("delete x").is_empty());

        assert_eq!(assist.explain("  "), "Empty command.");
        assert_eq!(
            assist.explain("sys info"),
            "Explain: command 'sys' would run. Example arguments: info"
        );
        assert_eq!(
            assist.explain("delete ~/a.txt"),
            "Explain: command 'delete' runs under its active contract."
        );
    }
}
