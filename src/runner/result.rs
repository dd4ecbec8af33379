//! Terminal run results

use crate::EaselError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// How one execution attempt ended
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Timeout,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Timeout => write!(f, "timeout"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Structured failure description
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunFailure {
    /// Stable error kind, see [`EaselError::kind`]
    pub kind: String,
    pub message: String,
}

impl From<&EaselError> for RunFailure {
    fn from(err: &EaselError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Outcome of exactly one execution attempt.
///
/// Output is all-or-nothing: it is only present on success.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunResult {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
    pub elapsed_seconds: f64,
    pub started_at: DateTime<Utc>,
}

impl RunResult {
    pub(crate) fn success(output: String, elapsed_seconds: f64, started_at: DateTime<Utc>) -> Self {
        Self {
            status: RunStatus::Success,
            output: Some(output),
            error: None,
            elapsed_seconds,
            started_at,
        }
    }

    pub(crate) fn timeout(timeout_secs: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            status: RunStatus::Timeout,
            output: None,
            error: Some(RunFailure {
                kind: "timeout".to_string(),
                message: format!("execution exceeded {}s", timeout_secs),
            }),
            elapsed_seconds: timeout_secs as f64,
            started_at,
        }
    }

    pub(crate) fn failed(err: &EaselError, elapsed_seconds: f64, started_at: DateTime<Utc>) -> Self {
        Self {
            status: RunStatus::Failed,
            output: None,
            error: Some(RunFailure::from(err)),
            elapsed_seconds,
            started_at,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Error kind, if the run did not succeed
    pub fn error_kind(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.kind.as_str())
    }
}
