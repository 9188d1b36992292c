use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Address, CommandKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Parse,
    ResolutionAbsent,
    ReadFailure,
    EstimationUnavailable,
    SubmissionRejected,
    SubmissionReverted,
    ValidationBlocked,
    MissingContext,
    Chain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorReport {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("malformed draft: {0}")]
    Parse(String),
    #[error("nothing resolved from {seed}")]
    ResolutionAbsent { seed: Address },
    #[error("read of {target} failed: {reason}")]
    ReadFailure { target: Address, reason: String },
    #[error("no signer available (connect wallet)")]
    EstimationUnavailable,
    #[error("transaction rejected by signer: {0}")]
    SubmissionRejected(String),
    #[error("transaction reverted: {0}")]
    SubmissionReverted(String),
    #[error("draft removes {} locked command(s): {}", .0.len(), join_keys(.0))]
    ValidationBlocked(Vec<CommandKey>),
    #[error("no {0} selected")]
    MissingContext(&'static str),
    #[error("chain request failed: {0}")]
    Chain(String),
}

fn join_keys(keys: &[CommandKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl CoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Parse(_) => ErrorCode::Parse,
            CoreError::ResolutionAbsent { .. } => ErrorCode::ResolutionAbsent,
            CoreError::ReadFailure { .. } => ErrorCode::ReadFailure,
            CoreError::EstimationUnavailable => ErrorCode::EstimationUnavailable,
            CoreError::SubmissionRejected(_) => ErrorCode::SubmissionRejected,
            CoreError::SubmissionReverted(_) => ErrorCode::SubmissionReverted,
            CoreError::ValidationBlocked(_) => ErrorCode::ValidationBlocked,
            CoreError::MissingContext(_) => ErrorCode::MissingContext,
            CoreError::Chain(_) => ErrorCode::Chain,
        }
    }

    /// Errors that stop an operation outright rather than degrading its data.
    pub fn is_blocking(&self) -> bool {
        !matches!(
            self,
            CoreError::ResolutionAbsent { .. } | CoreError::ReadFailure { .. }
        )
    }
}

impl From<CoreError> for ErrorReport {
    fn from(value: CoreError) -> Self {
        Self {
            code: value.code(),
            message: value.to_string(),
        }
    }
}

impl From<&CoreError> for ErrorReport {
    fn from(value: &CoreError) -> Self {
        Self {
            code: value.code(),
            message: value.to_string(),
        }
    }
}
