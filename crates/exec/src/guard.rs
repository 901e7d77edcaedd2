//! Security guard: command whitelist, path containment and process protection.

use std::collections::BTreeSet;
use std::env;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use kendali_config::SecurityConfig;

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)|%([A-Za-z_][A-Za-z0-9_]*)%")
        .expect("env var pattern is a valid regex")
});

#[derive(Debug, Clone)]
pub struct SecurityGuard {
    pub command_whitelist: BTreeSet<String>,
    pub allowed_roots: Vec<PathBuf>,
    /// Lower-cased.
    pub protected_process_names: BTreeSet<String>,
    pub protected_pids: BTreeSet<u64>,
}

impl SecurityGuard {
    /// Guard with the default protection lists and the home directory plus
    /// the current working directory as allowed roots.
    pub fn new(command_whitelist: BTreeSet<String>) -> Self {
        Self::from_config(&SecurityConfig::default(), command_whitelist)
    }

    pub fn from_config(config: &SecurityConfig, command_whitelist: BTreeSet<String>) -> Self {
        let mut whitelist = command_whitelist;
        whitelist.extend(config.extra_whitelist.iter().map(|k| k.to_lowercase()));

        let allowed_roots = if config.allowed_roots.is_empty() {
            default_roots()
        } else {
            config.allowed_roots.iter().map(PathBuf::from).collect()
        };

        Self {
            command_whitelist: whitelist,
            allowed_roots,
            protected_process_names: config
                .protected_process_names
                .iter()
                .map(|n| n.trim().to_lowercase())
                .collect(),
            protected_pids: config.protected_pids.iter().map(|&p| u64::from(p)).collect(),
        }
    }

    pub fn with_allowed_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.allowed_roots = roots;
        self
    }

    pub fn is_command_allowed(&self, keyword: &str) -> bool {
        self.command_whitelist.contains(keyword)
    }

    /// `true` when `target` resolves to an allowed root or something nested
    /// under one.  Both sides are expanded and resolved against the file
    /// system, so `..` and symlinks cannot walk out of a root.
    pub fn is_path_allowed(&self, target: &str) -> bool {
        let target = target.trim();
        if target.is_empty() {
            return false;
        }
        let resolved = resolve_path(&expand_path(target));
        let allowed = self.allowed_roots.iter().any(|root| {
            let root = resolve_path(&expand_path(&root.to_string_lossy()));
            resolved.starts_with(&root)
        });
        debug!(target = %resolved.display(), allowed, "path containment check");
        allowed
    }

    /// Numeric targets are checked against the protected PID set, anything
    /// else against the protected (lower-cased) name set.
    pub fn is_process_target_allowed(&self, target: &str) -> bool {
        let clean = target.trim().to_lowercase();
        if clean.is_empty() {
            return false;
        }
        if clean.chars().all(|c| c.is_ascii_digit()) {
            return match clean.parse::<u64>() {
                Ok(pid) => !self.protected_pids.contains(&pid),
                // Out of range for any real PID; nothing to protect.
                Err(_) => true,
            };
        }
        !self.protected_process_names.contains(&clean)
    }
}

fn default_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(home) = home_dir() {
        roots.push(home);
    }
    if let Ok(cwd) = env::current_dir() {
        roots.push(cwd);
    }
    roots
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Expand a leading `~` and `$VAR`, `${VAR}` or `%VAR%` references.
/// Unset variables are left untouched.
pub fn expand_path(raw: &str) -> PathBuf {
    expand_path_with(raw, |name| env::var(name).ok())
}

/// [`expand_path`] with variables read through `lookup`.
pub fn expand_path_with(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    let expanded = ENV_VAR.replace_all(raw, |caps: &Captures<'_>| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        lookup(name).unwrap_or_else(|| caps[0].to_string())
    });

    if expanded == "~" {
        if let Some(home) = home_dir() {
            return home;
        }
    }
    if let Some(rest) = expanded.strip_prefix("~/").or_else(|| expanded.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(expanded.as_ref())
}

/// Make `path` absolute, fold `.`/`..` lexically, then canonicalize the
/// deepest existing ancestor and re-append the missing tail.
pub fn resolve_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().unwrap_or_default().join(path)
    };
    let normalized = normalize_lexically(&absolute);

    let mut existing = normalized.as_path();
    let mut tail: Vec<OsString> = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut out = canonical;
            for part in tail.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return normalized,
        }
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}
