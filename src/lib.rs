//! Easel: non-interactive runner for coding agents
//!
//! Each invocation puts exactly one task on the easel: the request is
//! validated into an immutable configuration, the agent works under a
//! deadline, and whatever happens the workspace is handed back clean.

pub mod agent;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod runner;
pub mod runtime;
pub mod validate;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_support;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EaselError {
    #[error("Invalid mode '{value}'. Must be one of: {accepted}")]
    InvalidMode { value: String, accepted: String },

    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Invalid timeout '{0}': must be a positive number of seconds")]
    InvalidTimeout(String),

    #[error("Invalid model identifier '{0}': expected <provider>/<model-name>")]
    InvalidModel(String),

    #[error("Workspace '{path}' could not be initialized: {reason}")]
    WorkspaceInit { path: String, reason: String },

    #[error("No API key for provider '{provider}' (checked {checked})")]
    MissingCredentials { provider: String, checked: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Workspace is locked: {0}")]
    WorkspaceLocked(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EaselError {
    /// Stable machine-readable kind, recorded in failed run results.
    pub fn kind(&self) -> &'static str {
        match self {
            EaselError::InvalidMode { .. } => "invalid_mode",
            EaselError::EmptyMessage => "empty_message",
            EaselError::InvalidTimeout(_) => "invalid_timeout",
            EaselError::InvalidModel(_) => "invalid_model",
            EaselError::WorkspaceInit { .. } => "workspace_init",
            EaselError::MissingCredentials { .. } => "missing_credentials",
            EaselError::Config(_) => "config",
            EaselError::WorkspaceLocked(_) => "workspace_locked",
            EaselError::Agent(_) => "agent_execution",
            EaselError::Runtime(_) => "runtime",
            EaselError::Cancelled => "cancelled",
            EaselError::Io(_) => "io",
            EaselError::Json(_) => "json",
        }
    }

    /// True for errors raised while turning raw input into a configuration.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EaselError::InvalidMode { .. }
                | EaselError::EmptyMessage
                | EaselError::InvalidTimeout(_)
                | EaselError::InvalidModel(_)
                | EaselError::WorkspaceInit { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EaselError>;
