//! Result values every invocation resolves to.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use kendali_config::ExecutionProfile;
use kendali_tools::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Invalid,
    Blocked,
    Cancelled,
    PendingConfirmation,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Invalid => "invalid",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
            Self::PendingConfirmation => "pending_confirmation",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable reason attached to every result.  Callers branch on this,
/// never on message text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    #[default]
    None,
    EmptyCommand,
    CommandTooLong,
    CommandBlocked,
    ContractInvalid,
    SafeModeBlocked,
    ConfirmationRequired,
    UnknownHandler,
    ExecutionFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::EmptyCommand => "empty_command",
            Self::CommandTooLong => "command_too_long",
            Self::CommandBlocked => "command_blocked",
            Self::ContractInvalid => "contract_invalid",
            Self::SafeModeBlocked => "safe_mode_blocked",
            Self::ConfirmationRequired => "confirmation_required",
            Self::UnknownHandler => "unknown_handler",
            Self::ExecutionFailed => "execution_failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub ok: bool,
    pub status: Status,
    pub message: String,
    pub error_code: ErrorCode,
    pub requires_confirmation: bool,
    pub pending_command: Option<String>,
}

impl CommandResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(true, Status::Success, message, ErrorCode::None)
    }

    pub fn invalid(message: impl Into<String>, code: ErrorCode) -> Self {
        Self::new(false, Status::Invalid, message, code)
    }

    pub fn blocked(message: impl Into<String>, code: ErrorCode) -> Self {
        Self::new(false, Status::Blocked, message, code)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(false, Status::Cancelled, message, ErrorCode::None)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(false, Status::Failed, message, ErrorCode::ExecutionFailed)
    }

    pub fn pending(message: impl Into<String>, pending_command: impl Into<String>) -> Self {
        Self {
            requires_confirmation: true,
            pending_command: Some(pending_command.into()),
            ..Self::new(false, Status::PendingConfirmation, message, ErrorCode::ConfirmationRequired)
        }
    }

    fn new(ok: bool, status: Status, message: impl Into<String>, error_code: ErrorCode) -> Self {
        Self {
            ok,
            status,
            message: message.into(),
            error_code,
            requires_confirmation: false,
            pending_command: None,
        }
    }
}

/// Who ran what, under which profile.  Built once per top-level call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub user: String,
    pub profile: ExecutionProfile,
    pub session_id: String,
    pub timestamp: String,
    pub risk_level: RiskLevel,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(flatten)]
    pub result: CommandResult,
    pub context: Option<ExecutionContext>,
}

/// RFC 3339, seconds precision, UTC.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
