//! Maps loose system requests onto fixed capability plans.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemPlan {
    pub title: String,
    pub steps: Vec<String>,
    pub commands: Vec<String>,
    pub requires_confirmation: bool,
}

fn plan(title: &str, steps: &[&str], commands: &[&str], requires_confirmation: bool) -> SystemPlan {
    SystemPlan {
        title: title.to_string(),
        steps: steps.iter().map(|s| s.to_string()).collect(),
        commands: commands.iter().map(|s| s.to_string()).collect(),
        requires_confirmation,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIntentMapper;

impl SystemIntentMapper {
    pub fn map_request(&self, raw: &str) -> Option<SystemPlan> {
        let clean = raw.trim().to_lowercase();
        if clean.is_empty() {
            return None;
        }
        let has = |needle: &str| clean.contains(needle);

        if has("koneksi") || has("network") || has("internet") {
            return Some(plan(
                "Network Health Check",
                &["Ping target host", "Check interface status", "Summarize findings"],
                &["capability network ping google.com", "capability network interface_summary"],
                false,
            ));
        }
        if has("download") && (has("bersih") || has("cleanup") || has("clean up") || has("rapihin")) {
            return Some(plan(
                "Download Cleanup Preview",
                &[
                    "List files in the download folder",
                    "Detect large and duplicate files",
                    "Prepare an archive plan for confirmation",
                ],
                &["capability file preview_cleanup ~/Downloads"],
                true,
            ));
        }
        if has("proses") || has("process") {
            return Some(plan(
                "Process Overview",
                &["List running processes", "Highlight important processes"],
                &["capability process list"],
                false,
            ));
        }
        None
    }
}
