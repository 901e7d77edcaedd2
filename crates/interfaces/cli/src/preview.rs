use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use kendali_tools::CapabilityExecutor;

/// Capability executor that describes actions instead of performing them.
/// Only harmless reads (`system info`, `utility time`) answer for real.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreviewCapabilities;

#[async_trait]
impl CapabilityExecutor for PreviewCapabilities {
    async fn execute(&self, domain: &str, action: &str, args: &[String]) -> Result<String> {
        Ok(match (domain, action) {
            ("system", "info") => format!(
                "System: {} ({}), {} logical CPUs.",
                std::env::consts::OS,
                std::env::consts::ARCH,
                std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
            ),
            ("utility", "time") => format!("Current time: {}.", Utc::now().to_rfc3339()),
            _ if args.is_empty() => format!("[preview] {domain}.{action}"),
            _ => format!("[preview] {domain}.{action} {}", args.join(" ")),
        })
    }

    async fn terminate(&self, target: &str) -> Result<String> {
        Ok(format!("[preview] would terminate process '{target}'."))
    }

    async fn delete(&self, target: &str) -> Result<String> {
        Ok(format!("[preview] would delete '{target}'."))
    }

    async fn shutdown(&self) -> Result<String> {
        Ok("[preview] would shut the machine down.".to_string())
    }
}
