//! Easel runtime configuration, resolved from the environment.

use crate::{EaselError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Default execution deadline (30 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;

/// Default bound on cancellation acknowledgement and teardown.
pub const DEFAULT_RELEASE_GRACE_SECS: u64 = 5;

/// Agent command used by the process runtime when none is configured.
pub const DEFAULT_AGENT_COMMAND: &str = "easel-agent";

/// Runtime config for the runner and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Root for default workspaces (`EASEL_HOME`).
    pub home: PathBuf,
    /// Agent engine command line (`EASEL_AGENT_COMMAND`).
    pub agent_command: String,
    /// Grace period after cancellation and during teardown.
    pub release_grace: Duration,
    /// Deadline applied when the caller gives none.
    pub default_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let home = dirs::home_dir()
            .map(|h| h.join(".easel"))
            .unwrap_or_else(|| PathBuf::from(".easel"));
        Self {
            home,
            agent_command: DEFAULT_AGENT_COMMAND.to_string(),
            release_grace: Duration::from_secs(DEFAULT_RELEASE_GRACE_SECS),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl AppConfig {
    /// Resolve config from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = non_empty(lookup("EASEL_HOME")) {
            config.home = PathBuf::from(home);
        }
        if let Some(command) = non_empty(lookup("EASEL_AGENT_COMMAND")) {
            config.agent_command = command;
        }
        if let Some(raw) = non_empty(lookup("EASEL_RELEASE_GRACE_SECS")) {
            config.release_grace = Duration::from_secs(parse_secs("EASEL_RELEASE_GRACE_SECS", &raw)?);
        }
        if let Some(raw) = non_empty(lookup("EASEL_DEFAULT_TIMEOUT_SECS")) {
            let secs = parse_secs("EASEL_DEFAULT_TIMEOUT_SECS", &raw)?;
            if secs == 0 {
                return Err(EaselError::Config(
                    "EASEL_DEFAULT_TIMEOUT_SECS must be positive".to_string(),
                ));
            }
            config.default_timeout_secs = secs;
        }

        Ok(config)
    }

    /// Workspace used when the caller does not name one.
    pub fn default_workspace(&self) -> PathBuf {
        self.home.join("workspace")
    }

    /// Split the agent command line into program and arguments.
    pub fn agent_argv(&self) -> Result<(String, Vec<String>)> {
        let mut words = shell_words::split(&self.agent_command).map_err(|e| {
            EaselError::Config(format!(
                "EASEL_AGENT_COMMAND '{}' is not a valid command line: {}",
                self.agent_command, e
            ))
        })?;
        if words.is_empty() {
            return Err(EaselError::Config("EASEL_AGENT_COMMAND is empty".to_string()));
        }
        let program = words.remove(0);
        Ok((program, words))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_secs(key: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>().map_err(|_| {
        EaselError::Config(format!("{} must be a whole number of seconds, got '{}'", key, raw))
    })
}
