//! Per-conversation state: pending confirmation slot, active profile, the
//! ordered session log and command-frequency memory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kendali_exec::ExecutionProfilePolicy;
use kendali_intent::{AutoCorrection, ContextEntry, RetrievalOptimizer};
use kendali_tools::ParsedCommand;

use crate::result::timestamp_now;

/// Status tag for log entries that record a semantic resolution rather than
/// an outcome.
pub const INTENT_RESOLVED: &str = "intent_resolved";

/// The single item awaiting an explicit confirm / cancel.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingConfirmation {
    Command(ParsedCommand),
    Correction(AutoCorrection),
}

impl PendingConfirmation {
    /// The text echoed back to the caller as `pending_command`.
    pub fn display_text(&self) -> &str {
        match self {
            Self::Command(cmd) => &cmd.raw,
            Self::Correction(fix) => &fix.corrected,
        }
    }
}

// ── Session log ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub timestamp: String,
    pub command: String,
    pub message: String,
    pub status: String,
}

impl ContextEntry for SessionEntry {
    fn command(&self) -> &str {
        &self.command
    }

    fn status(&self) -> &str {
        &self.status
    }
}

#[derive(Debug, Serialize)]
struct SessionExport<'a> {
    session_name: &'a str,
    count: usize,
    entries: &'a [SessionEntry],
}

#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    name: String,
    entries: Vec<SessionEntry>,
}

impl SessionLog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, command: &str, message: &str, status: &str) -> &SessionEntry {
        self.entries.push(SessionEntry {
            timestamp: timestamp_now(),
            command: command.to_string(),
            message: message.to_string(),
            status: status.to_string(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[SessionEntry] {
        &self.entries
    }

    /// The last `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> &[SessionEntry] {
        let start = self.entries.len().saturating_sub(limit);
        &self.entries[start..]
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn to_json(&self) -> Result<String> {
        let export = SessionExport {
            session_name: &self.name,
            count: self.entries.len(),
            entries: &self.entries,
        };
        serde_json::to_string_pretty(&export).context("serialize session log")
    }

    /// Write the log as pretty JSON, creating parent directories.
    pub fn export_json(&self, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(path, self.to_json()?).with_context(|| format!("write session export {}", path.display()))?;
        Ok(path.to_path_buf())
    }
}

// ── Command memory ───────────────────────────────────────────────────────────

/// Execution counts per command text.
#[derive(Debug, Clone, Default)]
pub struct CommandMemory {
    // command -> (first-seen order, count)
    counts: HashMap<String, (usize, usize)>,
}

impl CommandMemory {
    pub fn record(&mut self, command: &str) {
        let next = self.counts.len();
        self.counts.entry(command.to_string()).or_insert((next, 0)).1 += 1;
    }

    /// Most frequent first; ties keep first-seen order.
    pub fn top_commands(&self, limit: usize) -> Vec<(String, usize)> {
        let mut rows: Vec<(&String, &(usize, usize))> = self.counts.iter().collect();
        rows.sort_by(|(_, (order_a, count_a)), (_, (order_b, count_b))| {
            count_b.cmp(count_a).then(order_a.cmp(order_b))
        });
        rows.into_iter()
            .take(limit)
            .map(|(command, (_, count))| (command.clone(), *count))
            .collect()
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user: String,
    pub safe_mode: bool,
    pub profile: ExecutionProfilePolicy,
    pub log: SessionLog,
    pub memory: CommandMemory,
    pub retrieval: RetrievalOptimizer,
    pending: Option<PendingConfirmation>,
}

impl Session {
    pub fn new(
        name: impl Into<String>,
        user: impl Into<String>,
        safe_mode: bool,
        profile: ExecutionProfilePolicy,
        retrieval: RetrievalOptimizer,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user: user.into(),
            safe_mode,
            profile,
            log: SessionLog::new(name),
            memory: CommandMemory::default(),
            retrieval,
            pending: None,
        }
    }

    pub fn pending(&self) -> Option<&PendingConfirmation> {
        self.pending.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn set_pending(&mut self, pending: PendingConfirmation) {
        self.pending = Some(pending);
    }

    pub(crate) fn take_pending(&mut self) -> Option<PendingConfirmation> {
        self.pending.take()
    }

    /// Append to the log and bump the command counter.
    pub fn record(&mut self, command: &str, message: &str, status: &str) {
        self.log.record(command, message, status);
        self.memory.record(command);
    }

    /// Prior entries most relevant to `query`, best first.
    pub fn relevant_context(&self, query: &str) -> Vec<&SessionEntry> {
        self.retrieval
            .rank_session_context(self.log.entries(), query, self.retrieval.context_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session() -> Session {
        Session::new(
            "test-session",
            "tester",
            true,
            ExecutionProfilePolicy::default(),
            RetrievalOptimizer::default(),
        )
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut log = SessionLog::new("s");
        for i in 0..5 {
            log.record(&format!("cmd {i}"), "ok", "success");
        }
        let recent: Vec<&str> = log.recent(2).iter().map(|e| e.command.as_str()).collect();
        assert_eq!(recent, vec!["cmd 3", "cmd 4"]);
        assert!(log.recent(0).is_empty());
        assert_eq!(log.recent(50).len(), 5);
        log.clear();
        assert!(log.entries().is_empty());
    }

    #[test]
    fn export_writes_named_payload() {
        let dir = TempDir::new().unwrap();
        let mut log = SessionLog::new("router-session");
        log.record("sys info", "ok", "success");
        log.record("delete x", "confirm first", "pending_confirmation");

        let path = log.export_json(&dir.path().join("nested/export.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["session_name"], "router-session");
        assert_eq!(value["count"], 2);
        assert_eq!(value["entries"][1]["status"], "pending_confirmation");
    }

    #[test]
    fn memory_ranks_by_frequency_then_first_seen() {
        let mut memory = CommandMemory::default();
        for cmd in ["open vscode", "sys info", "sys info", "search file a", "open vscode"] {
            memory.record(cmd);
        }
        let top = memory.top_commands(2);
        assert_eq!(
            top,
            vec![("open vscode".to_string(), 2), ("sys info".to_string(), 2)]
        );
    }

    #[test]
    fn pending_slot_take_clears() {
        let mut s = session();
        assert!(!s.has_pending());
        s.set_pending(PendingConfirmation::Command(ParsedCommand::parse("delete a.txt").unwrap()));
        assert_eq!(s.pending().map(|p| p.display_text()), Some("delete a.txt"));
        assert!(s.take_pending().is_some());
        assert!(s.take_pending().is_none());
    }

    #[test]
    fn relevant_context_uses_log() {
        let mut s = session();
        s.record("search file budget.xlsx", "found", "success");
        s.record("sys info", "ok", "success");
        let ranked = s.relevant_context("budget");
        assert_eq!(ranked[0].command, "search file budget.xlsx");
    }
}
