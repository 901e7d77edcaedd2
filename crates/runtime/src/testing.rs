use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use kendali_config::AppConfig;
use kendali_tools::CapabilityExecutor;

use crate::router::CommandRouter;

/// Records every call as one line; optionally fails the next one.
#[derive(Default)]
pub struct RecordingCapabilities {
    calls: Mutex<Vec<String>>,
    fail_next: Mutex<Option<String>>,
}

impl RecordingCapabilities {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_next(&self, message: &str) {
        *self.fail_next.lock().unwrap() = Some(message.to_string());
    }

    fn record(&self, parts: &[&str]) -> Result<String> {
        let line = parts
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(message) = self.fail_next.lock().unwrap().take() {
            return Err(anyhow!(message));
        }
        self.calls.lock().unwrap().push(line.clone());
        Ok(format!("ok: {line}"))
    }
}

#[async_trait]
impl CapabilityExecutor for RecordingCapabilities {
    async fn execute(&self, domain: &str, action: &str, args: &[String]) -> Result<String> {
        let joined = args.join(" ");
        self.record(&["execute", domain, action, &joined])
    }

    async fn terminate(&self, target: &str) -> Result<String> {
        self.record(&["terminate", target])
    }

    async fn delete(&self, target: &str) -> Result<String> {
        self.record(&["delete", target])
    }

    async fn shutdown(&self) -> Result<String> {
        self.record(&["shutdown"])
    }
}

/// Router over the built-in plugins with the given allowed roots (empty
/// keeps the defaults).
pub fn router_with_roots(roots: Vec<String>) -> (CommandRouter, Arc<RecordingCapabilities>) {
    let mut config = AppConfig::default();
    config.security.allowed_roots = roots;
    let caps = Arc::new(RecordingCapabilities::default());
    let router = CommandRouter::builder(caps.clone())
        .config(config)
        .build()
        .unwrap();
    (router, caps)
}
