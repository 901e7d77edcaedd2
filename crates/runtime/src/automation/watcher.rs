use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use globset::{Glob, GlobMatcher};
use tracing::{debug, warn};
use walkdir::WalkDir;

use kendali_exec::expand_path;

use super::rules::{TriggerActionRule, TriggerType};

type Snapshot = BTreeMap<PathBuf, Option<SystemTime>>;

/// Polling file watcher.  Each rule's watched tree is snapshotted as
/// path → modification time; any difference from the previous snapshot fires
/// the rule.  The first snapshot of a rule is only a baseline.
#[derive(Debug, Clone, Default)]
pub struct FileWatcherEngine {
    snapshots: HashMap<String, Snapshot>,
}

impl FileWatcherEngine {
    pub fn triggered_rules(&mut self, rules: &[TriggerActionRule]) -> Vec<String> {
        let mut fired = Vec::new();
        for rule in rules.iter().filter(|r| r.trigger_type == TriggerType::FileWatch) {
            let root = expand_path(rule.config_str("path").unwrap_or_default());
            let pattern = rule.config_str("pattern").unwrap_or("*");
            let current = snapshot(&root, pattern);

            let Some(previous) = self.snapshots.insert(rule.rule_id.clone(), current) else {
                debug!(rule_id = %rule.rule_id, root = %root.display(), "file watch baseline");
                continue;
            };
            if self.snapshots.get(&rule.rule_id) != Some(&previous) {
                fired.push(rule.rule_id.clone());
            }
        }
        fired
    }
}

/// Files under `root` whose name matches `pattern`.  A missing root or a bad
/// pattern is an empty snapshot.
fn snapshot(root: &Path, pattern: &str) -> Snapshot {
    if !root.is_dir() {
        return Snapshot::new();
    }
    let matcher: GlobMatcher = match Glob::new(pattern) {
        Ok(glob) => glob.compile_matcher(),
        Err(err) => {
            warn!(pattern, %err, "invalid watch pattern");
            return Snapshot::new();
        }
    };

    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            matcher.is_match(entry.file_name()) || matcher.is_match(relative)
        })
        .map(|entry| {
            let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
            (entry.into_path(), modified)
        })
        .collect()
}
