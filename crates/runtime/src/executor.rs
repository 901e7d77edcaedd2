//! Single entry point for hosts: one call in, one [`ResponseEnvelope`] out.

use tracing::info;

use crate::result::{ExecutionContext, ResponseEnvelope, timestamp_now};
use crate::router::{CommandRouter, MultiStepReport, RunOptions};
use crate::session::Session;

pub struct UnifiedExecutor<'r> {
    router: &'r CommandRouter,
}

impl<'r> UnifiedExecutor<'r> {
    pub fn new(router: &'r CommandRouter) -> Self {
        Self { router }
    }

    /// Context for `text` as the router will see it: the risk comes from
    /// the keyword after intent resolution.
    pub fn context(&self, session: &Session, text: &str, dry_run: bool) -> ExecutionContext {
        let resolved = self.router.resolve(text).resolved;
        let keyword = resolved
            .split_whitespace()
            .next()
            .map(str::to_lowercase)
            .unwrap_or_default();
        ExecutionContext {
            user: session.user.clone(),
            profile: session.profile.profile(),
            session_id: session.id.to_string(),
            timestamp: timestamp_now(),
            risk_level: session.profile.risk_level(&keyword),
            dry_run,
        }
    }

    pub async fn run(&self, session: &mut Session, text: &str, dry_run: bool) -> ResponseEnvelope {
        let context = self.context(session, text, dry_run);
        let result = self
            .router
            .execute_with(session, text, RunOptions { dry_run })
            .await;
        info!(
            session = %context.session_id,
            status = %result.status,
            code = result.error_code.as_str(),
            dry_run,
            "command finished"
        );
        ResponseEnvelope {
            result,
            context: Some(context),
        }
    }

    /// Answer the pending confirmation.  The context describes the command
    /// that was waiting, if any.
    pub async fn confirm(&self, session: &mut Session, approved: bool) -> ResponseEnvelope {
        let context = session
            .pending()
            .map(|p| p.display_text().to_string())
            .map(|text| self.context(session, &text, false));
        let result = self.router.confirm_pending(session, approved).await;
        ResponseEnvelope { result, context }
    }

    pub async fn run_multi_step(&self, session: &mut Session, text: &str) -> MultiStepReport {
        self.router.run_multi_step(session, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{ErrorCode, Status};
    use crate::testing::router_with_roots;
    use kendali_config::ExecutionProfile;
    use kendali_tools::RiskLevel;

    #[tokio::test]
    async fn envelope_carries_context() {
        let (router, _caps) = router_with_roots(Vec::new());
        let executor = UnifiedExecutor::new(&router);
        let mut session = router.new_session();

        let envelope = executor.run(&mut session, "buka chrome", false).await;
        assert_eq!(envelope.result.status, Status::Success);
        let context = envelope.context.unwrap();
        assert_eq!(context.user, "local");
        assert_eq!(context.profile, ExecutionProfile::Strict);
        assert_eq!(context.session_id, session.id.to_string());
        assert_eq!(context.risk_level, RiskLevel::Low);
        assert!(!context.dry_run);
    }

    #[tokio::test]
    async fn envelope_flattens_result_fields() {
        let (router, _caps) = router_with_roots(Vec::new());
        let executor = UnifiedExecutor::new(&router);
        let mut session = router.new_session();

        let envelope = executor.run(&mut session, "", true).await;
        assert_eq!(envelope.result.error_code, ErrorCode::EmptyCommand);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["status"], "invalid");
        assert_eq!(value["error_code"], "empty_command");
        assert_eq!(value["context"]["dry_run"], true);
    }

    #[tokio::test]
    async fn confirm_reports_waiting_command_risk() {
        let (router, caps) = router_with_roots(Vec::new());
        let executor = UnifiedExecutor::new(&router);
        let mut session = router.new_session();

        executor.run(&mut session, "kill notepad.exe", false).await;
        let envelope = executor.confirm(&mut session, true).await;
        assert_eq!(envelope.result.status, Status::Success);
        assert_eq!(envelope.context.unwrap().risk_level, RiskLevel::High);
        assert_eq!(caps.calls(), vec!["terminate notepad.exe".to_string()]);

        let nothing = executor.confirm(&mut session, true).await;
        assert!(nothing.context.is_none());
        assert_eq!(nothing.result.status, Status::Invalid);
    }
}
