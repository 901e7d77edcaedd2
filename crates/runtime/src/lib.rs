pub mod automation;
pub mod executor;
pub mod handlers;
pub mod multi;
pub mod result;
pub mod router;
pub mod session;

#[cfg(test)]
mod testing;

pub use automation::{
    ActionOutcome, ActionRunner, ApprovalDecision, ApprovalHook, ApprovalRequest, AutomationEngine,
    AutomationExecution, ChannelApproval, Clock, FnApproval, RouterActionRunner, RuleError, RuleRegistry,
    SystemClock, TriggerActionRule, TriggerType, approval_channel,
};
pub use executor::UnifiedExecutor;
pub use handlers::{CommandHandler, HandlerCall, HandlerReply, HandlerSet};
pub use multi::{CommandReport, CommandRunner, ExecutionMode, MultiCommandExecutor, MultiCommandItem};
pub use result::{CommandResult, ErrorCode, ExecutionContext, ResponseEnvelope, Status};
pub use router::{CommandRouter, CommandRouterBuilder, MultiStepReport, RunOptions};
pub use session::{CommandMemory, PendingConfirmation, Session, SessionEntry, SessionLog};
