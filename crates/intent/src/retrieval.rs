//! Query normalization, redundant-command reduction, session-context ranking
//! and a small TTL cache for derived payloads.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::Value;
use tracing::trace;

use kendali_config::RetrievalConfig;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z0-9]+").expect("token pattern is a valid regex"));

const TOKEN_NOISE: &[&str] = &["tolong", "please", "dong", "cari", "file", "the", "a"];
const EXACT_MATCH: f64 = 1.0;
const PARTIAL_MATCH: f64 = 0.6;
const SUCCESS_BONUS: f64 = 0.2;

/// Anything that can be ranked as prior session context.
pub trait ContextEntry {
    fn command(&self) -> &str;
    fn status(&self) -> &str;
}

// ── TTL cache ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: HashMap<String, (Instant, V)>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Stale entries are evicted by the read that finds them.
    pub fn get_at(&mut self, key: &str, now: Instant) -> Option<V> {
        let (created, value) = self.entries.get(key)?;
        if now.saturating_duration_since(*created) > self.ttl {
            trace!(key, "cache entry expired");
            self.entries.remove(key);
            return None;
        }
        Some(value.clone())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&mut self, key: impl Into<String>, value: V, now: Instant) {
        self.entries.insert(key.into(), (now, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Optimizer ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RetrievalOptimizer {
    pub context_limit: usize,
    pub cache: TtlCache<Value>,
}

impl Default for RetrievalOptimizer {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

impl RetrievalOptimizer {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            context_limit: config.context_limit,
            cache: TtlCache::new(Duration::from_secs(config.cache_ttl_secs)),
        }
    }

    /// Lower-cased with whitespace runs collapsed.
    pub fn optimize_query(raw: &str) -> String {
        raw.split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Drop commands whose normalized text was already seen; the first
    /// occurrence keeps its original spelling.
    pub fn reduce_redundant_patterns<S: AsRef<str>>(commands: &[S]) -> Vec<String> {
        let mut seen = HashSet::new();
        commands
            .iter()
            .map(AsRef::as_ref)
            .filter(|c| seen.insert(Self::optimize_query(c)))
            .map(str::to_string)
            .collect()
    }

    /// Top `limit` entries by token overlap + recency + success bonus.
    /// `entries` is oldest-first; zero-score entries are never returned.
    pub fn rank_session_context<'a, T: ContextEntry>(
        &self,
        entries: &'a [T],
        query: &str,
        limit: usize,
    ) -> Vec<&'a T> {
        let query_tokens = tokens(query);
        let total = entries.len();

        let mut ranked: Vec<(f64, &T)> = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let overlap = fuzzy_overlap(&query_tokens, &tokens(entry.command()));
                let recency = (total - index) as f64 / total.max(1) as f64;
                let success = if entry.status() == "success" { SUCCESS_BONUS } else { 0.0 };
                (overlap + recency + success, entry)
            })
            .collect();

        ranked.sort_by(|(left, _), (right, _)| right.total_cmp(left));
        ranked
            .into_iter()
            .take(limit)
            .filter(|(score, _)| *score > 0.0)
            .map(|(_, entry)| entry)
            .collect()
    }
}

fn tokens(value: &str) -> Vec<String> {
    let normalized = RetrievalOptimizer::optimize_query(value);
    TOKEN
        .find_iter(&normalized)
        .map(|m| m.as_str())
        .filter(|t| !TOKEN_NOISE.contains(t))
        .map(str::to_string)
        .collect()
}

fn fuzzy_overlap(query: &[String], target: &[String]) -> f64 {
    query
        .iter()
        .filter_map(|token| {
            target.iter().find_map(|candidate| {
                if token == candidate {
                    Some(EXACT_MATCH)
                } else if token.contains(candidate.as_str()) || candidate.contains(token.as_str()) {
                    Some(PARTIAL_MATCH)
                } else {
                    None
                }
            })
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Entry {
        command: &'static str,
        status: &'static str,
    }

    impl ContextEntry for Entry {
        fn command(&self) -> &str {
            self.command
        }
        fn status(&self) -> &str {
            self.status
        }
    }

    #[test]
    fn optimize_query_collapses_whitespace() {
        assert_eq!(RetrievalOptimizer::optimize_query("  Open   VSCode\t"), "open vscode");
    }

    #[test]
    fn reduce_keeps_first_spelling() {
        let reduced = RetrievalOptimizer::reduce_redundant_patterns(&["Open VSCode", "open  vscode", "sys info", "SYS INFO"]);
        assert_eq!(reduced, vec!["Open VSCode".to_string(), "sys info".to_string()]);
    }

    #[test]
    fn ranking_prefers_overlap_then_recency() {
        let entries = [
            Entry { command: "search file report.pdf", status: "success" },
            Entry { command: "open vscode", status: "success" },
            Entry { command: "sys info", status: "failed" },
        ];
        let optimizer = RetrievalOptimizer::default();
        let ranked = optimizer.rank_session_context(&entries, "report", 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].command, "search file report.pdf");
        assert_eq!(ranked[1].command, "open vscode");
    }

    #[test]
    fn partial_token_match_scores_lower_than_exact() {
        assert_eq!(fuzzy_overlap(&tokens("vscode"), &tokens("open vscode")), 1.0);
        assert_eq!(fuzzy_overlap(&tokens("vs"), &tokens("open vscode")), 0.6);
        assert_eq!(fuzzy_overlap(&tokens("please the file"), &tokens("open")), 0.0);
    }

    #[test]
    fn empty_entries_rank_to_nothing() {
        let entries: [Entry; 0] = [];
        assert!(RetrievalOptimizer::default().rank_session_context(&entries, "x", 4).is_empty());
    }

    #[test]
    fn cache_expires_after_ttl() {
        let mut cache = TtlCache::new(Duration::from_secs(180));
        let start = Instant::now();
        cache.insert_at("plan", 7_u32, start);
        assert_eq!(cache.get_at("plan", start + Duration::from_secs(180)), Some(7));
        assert_eq!(cache.get_at("plan", start + Duration::from_secs(181)), None);
        assert!(cache.is_empty());
        assert_eq!(cache.get("missing"), None);
    }
}
