//! Free text → canonical command string.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

const OPEN_MARKERS: &[&str] = &["open", "buka", "bukakan", "launch", "jalankan"];
const SEARCH_MARKERS: &[&str] = &["search", "cari", "find", "temukan"];
const SYS_MARKERS: &[&str] = &["sys", "status", "info"];
const QUERY_NOISE: &[&str] = &["tolong", "dong", "berkas", "file", "carikan", "ya", "please"];
const MAX_QUERY_WORDS: usize = 4;

const OPEN_CONFIDENCE: f64 = 0.78;
const SEARCH_CONFIDENCE: f64 = 0.76;
const SYS_CONFIDENCE: f64 = 0.72;

static FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9_\-]+\.[a-z0-9]{2,8})").expect("filename pattern is a valid regex"));
static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9_.\-]+").expect("word pattern is a valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionReason {
    Empty,
    StrictKeyword,
    SemanticOpen,
    SemanticSearch,
    SemanticSys,
    Unresolved,
}

impl ResolutionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::StrictKeyword => "strict_keyword",
            Self::SemanticOpen => "semantic_open",
            Self::SemanticSearch => "semantic_search",
            Self::SemanticSys => "semantic_sys",
            Self::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for ResolutionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResolution {
    pub original: String,
    pub resolved: String,
    pub confidence: f64,
    pub reason: ResolutionReason,
}

impl IntentResolution {
    /// Resolved through an alias table rather than a literal keyword.
    pub fn is_semantic(&self) -> bool {
        matches!(
            self.reason,
            ResolutionReason::SemanticOpen | ResolutionReason::SemanticSearch | ResolutionReason::SemanticSys
        )
    }
}

/// Rule-based resolver: strict keyword match first, then the open / search /
/// sys alias tables.
#[derive(Debug, Clone)]
pub struct IntentResolver {
    app_aliases: Vec<String>,
}

impl Default for IntentResolver {
    fn default() -> Self {
        Self::new(["vscode", "chrome", "notepad"].iter().map(|s| s.to_string()).collect())
    }
}

impl IntentResolver {
    pub fn new(app_aliases: Vec<String>) -> Self {
        Self {
            app_aliases: app_aliases.into_iter().map(|a| a.to_lowercase()).collect(),
        }
    }

    pub fn resolve(&self, raw: &str, allowed_keywords: &BTreeSet<String>) -> IntentResolution {
        let clean = raw.trim();
        if clean.is_empty() {
            return IntentResolution {
                original: raw.to_string(),
                resolved: String::new(),
                confidence: 1.0,
                reason: ResolutionReason::Empty,
            };
        }

        let first = clean.split_whitespace().next().unwrap_or_default().to_lowercase();
        if allowed_keywords.contains(&first) {
            return IntentResolution {
                original: clean.to_string(),
                resolved: clean.to_string(),
                confidence: 1.0,
                reason: ResolutionReason::StrictKeyword,
            };
        }

        if let Some((resolved, confidence, reason)) = self.semantic_match(clean, allowed_keywords) {
            debug!(input = clean, resolved = %resolved, %reason, "semantic intent match");
            return IntentResolution {
                original: clean.to_string(),
                resolved,
                confidence,
                reason,
            };
        }

        IntentResolution {
            original: raw.to_string(),
            resolved: clean.to_string(),
            confidence: 0.0,
            reason: ResolutionReason::Unresolved,
        }
    }

    fn semantic_match(
        &self,
        clean: &str,
        allowed: &BTreeSet<String>,
    ) -> Option<(String, f64, ResolutionReason)> {
        let lowered = clean.to_lowercase();
        let words = words(&lowered);

        if allowed.contains("open") && contains_any(&words, OPEN_MARKERS) {
            if let Some(alias) = self.app_aliases.iter().find(|a| words.contains(&a.as_str())) {
                return Some((format!("open {alias}"), OPEN_CONFIDENCE, ResolutionReason::SemanticOpen));
            }
        }

        if allowed.contains("search") && contains_any(&words, SEARCH_MARKERS) {
            let query = extract_query(&lowered);
            if !query.is_empty() {
                return Some((
                    format!("search file {query}"),
                    SEARCH_CONFIDENCE,
                    ResolutionReason::SemanticSearch,
                ));
            }
        }

        let system_pair = words.contains(&"system") && (words.contains(&"status") || words.contains(&"info"));
        if allowed.contains("sys") && (contains_any(&words, SYS_MARKERS) || system_pair) {
            return Some(("sys info".to_string(), SYS_CONFIDENCE, ResolutionReason::SemanticSys));
        }

        None
    }
}

fn words(lowered: &str) -> Vec<&str> {
    WORD.find_iter(lowered).map(|m| m.as_str()).collect()
}

fn contains_any(words: &[&str], markers: &[&str]) -> bool {
    words.iter().any(|w| markers.contains(w))
}

/// First filename-looking token, otherwise up to four non-noise words.
fn extract_query(lowered: &str) -> String {
    if let Some(found) = FILENAME.captures(lowered).and_then(|c| c.get(1)) {
        return found.as_str().to_string();
    }
    words(lowered)
        .into_iter()
        .filter(|w| !SEARCH_MARKERS.contains(w) && !QUERY_NOISE.contains(w))
        .take(MAX_QUERY_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Insert the `file` literal into `search <x>` when it is missing.
pub fn normalize_shortcuts(text: &str) -> String {
    let trimmed = text.trim();
    let mut tokens = trimmed.split_whitespace();
    let Some(first) = tokens.next() else {
        return trimmed.to_string();
    };
    if !first.eq_ignore_ascii_case("search") {
        return trimmed.to_string();
    }
    let rest: Vec<&str> = tokens.collect();
    match rest.first() {
        None => trimmed.to_string(),
        Some(next) if next.eq_ignore_ascii_case("file") => trimmed.to_string(),
        Some(_) => format!("{first} file {}", rest.join(" ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn all() -> BTreeSet<String> {
        allowed(&["open", "search", "sys", "delete"])
    }

    #[test]
    fn empty_input() {
        let r = IntentResolver::default().resolve("   ", &all());
        assert_eq!(r.reason, ResolutionReason::Empty);
        assert_eq!(r.confidence, 1.0);
        assert_eq!(r.resolved, "");
    }

    #[test]
    fn strict_keyword_is_case_insensitive() {
        let r = IntentResolver::default().resolve("  OPEN vscode ", &all());
        assert_eq!(r.reason, ResolutionReason::StrictKeyword);
        assert_eq!(r.resolved, "OPEN vscode");
        assert_eq!(r.confidence, 1.0);
        assert!(!r.is_semantic());
    }

    #[test]
    fn semantic_open_needs_marker_and_alias() {
        let resolver = IntentResolver::default();
        let r = resolver.resolve("tolong buka chrome dong", &all());
        assert_eq!(r.reason, ResolutionReason::SemanticOpen);
        assert_eq!(r.resolved, "open chrome");
        assert_eq!(r.confidence, 0.78);
        assert!(r.is_semantic());

        let unknown_app = resolver.resolve("launch photoshop", &all());
        assert_eq!(unknown_app.reason, ResolutionReason::Unresolved);
    }

    #[test]
    fn semantic_search_prefers_filename() {
        let r = IntentResolver::default().resolve("tolong cari file laporan_q3.xlsx ya", &all());
        assert_eq!(r.reason, ResolutionReason::SemanticSearch);
        assert_eq!(r.resolved, "search file laporan_q3.xlsx");
        assert_eq!(r.confidence, 0.76);
    }

    #[test]
    fn semantic_search_caps_query_words() {
        let r = IntentResolver::default().resolve("find please budget notes from last spring meeting", &all());
        assert_eq!(r.resolved, "search file budget notes from last");
    }

    #[test]
    fn search_with_only_noise_falls_through() {
        let r = IntentResolver::default().resolve("cari dong", &allowed(&["search"]));
        assert_eq!(r.reason, ResolutionReason::Unresolved);
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn semantic_sys_markers_and_system_pair() {
        let resolver = IntentResolver::default();
        let r = resolver.resolve("show me the status", &all());
        assert_eq!(r.reason, ResolutionReason::SemanticSys);
        assert_eq!(r.resolved, "sys info");
        assert_eq!(r.confidence, 0.72);
    }

    #[test]
    fn semantic_match_respects_allowed_keywords() {
        let r = IntentResolver::default().resolve("buka vscode", &allowed(&["sys"]));
        assert_eq!(r.reason, ResolutionReason::Unresolved);
        assert_eq!(r.resolved, "buka vscode");
    }

    #[test]
    fn shortcut_normalization() {
        assert_eq!(normalize_shortcuts("search notes.txt"), "search file notes.txt");
        assert_eq!(normalize_shortcuts("search file notes.txt"), "search file notes.txt");
        assert_eq!(normalize_shortcuts("SEARCH FILE a"), "SEARCH FILE a");
        assert_eq!(normalize_shortcuts("search"), "search");
        assert_eq!(normalize_shortcuts("open vscode"), "open vscode");
        assert_eq!(normalize_shortcuts(""), "");
    }
}
