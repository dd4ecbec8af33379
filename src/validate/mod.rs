//! Configuration validation
//!
//! Turns raw, untrusted invocation parameters into an immutable
//! [`RunConfiguration`]. This is the only way to build one, so holding a
//! configuration means every check below has already passed.

use crate::agent::{Mode, ModelId};
use crate::config::DEFAULT_TIMEOUT_SECS;
use crate::workspace::{self, WorkspaceLayout};
use crate::{EaselError, Result};
use std::path::Path;
use std::time::Duration;

/// Raw invocation parameters, as received from the dispatcher
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub workspace: String,
    pub model: String,
    pub mode: String,
    pub message: String,
    /// Seconds, unparsed; `None` means the default
    pub timeout: Option<String>,
    pub verbose: bool,
}

impl RunRequest {
    pub fn new(
        workspace: impl Into<String>,
        model: impl Into<String>,
        mode: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            workspace: workspace.into(),
            model: model.into(),
            mode: mode.into(),
            message: message.into(),
            timeout: None,
            verbose: false,
        }
    }

    pub fn with_timeout(mut self, timeout: impl ToString) -> Self {
        self.timeout = Some(timeout.to_string());
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// A validated, immutable run configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    layout: WorkspaceLayout,
    model: ModelId,
    mode: Mode,
    message: String,
    timeout_secs: u64,
    verbose: bool,
}

impl RunConfiguration {
    pub fn workspace(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    pub fn model(&self) -> &ModelId {
        &self.model
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

/// Validate a request and prepare its workspace.
///
/// Input checks run before anything touches the disk, so a rejected
/// request never creates a workspace. Creating the layout is the only
/// side effect.
pub fn validate(request: &RunRequest) -> Result<RunConfiguration> {
    if request.workspace.trim().is_empty() {
        return Err(EaselError::WorkspaceInit {
            path: request.workspace.clone(),
            reason: "workspace path is empty".to_string(),
        });
    }

    let mode: Mode = request.mode.parse()?;

    if request.message.trim().is_empty() {
        return Err(EaselError::EmptyMessage);
    }

    let timeout_secs = parse_timeout(request.timeout.as_deref())?;
    let model: ModelId = request.model.parse()?;

    let layout = workspace::ensure_layout(&request.workspace)?;
    tracing::debug!(
        "Validated run: workspace={:?} model={} mode={} timeout={}s",
        layout.root(),
        model,
        mode,
        timeout_secs
    );

    Ok(RunConfiguration {
        layout,
        model,
        mode,
        message: request.message.clone(),
        timeout_secs,
        verbose: request.verbose,
    })
}

/// Parse a timeout in seconds. Absent means the default; anything that is
/// not a positive whole number is rejected.
pub fn parse_timeout(raw: Option<&str>) -> Result<u64> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_TIMEOUT_SECS);
    };
    let invalid = || EaselError::InvalidTimeout(raw.to_string());

    let value: i64 = raw.trim().parse().map_err(|_| invalid())?;
    if value <= 0 {
        return Err(invalid());
    }
    u64::try_from(value).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(ws: &Path) -> RunRequest {
        RunRequest::new(ws.to_string_lossy(), "openai/gpt-4", "ask", "1+1=?")
    }

    #[test]
    fn test_accepts_every_recognized_mode() {
        let tmp = TempDir::new().unwrap();
        for mode in ["code", "ask", "architect", "plan", "debug"] {
            let mut req = request(tmp.path());
            req.mode = mode.to_string();
            let config = validate(&req).unwrap();
            assert_eq!(config.mode().as_str(), mode);
        }
    }

    #[test]
    fn test_rejects_unknown_modes() {
        let tmp = TempDir::new().unwrap();
        for mode in ["orchestrator", "Code", "", "ask "] {
            let mut req = request(tmp.path());
            req.mode = mode.to_string();
            match validate(&req) {
                Err(EaselError::InvalidMode { value, accepted }) => {
                    assert_eq!(value, mode);
                    assert!(accepted.contains("architect"));
                }
                other => panic!("expected InvalidMode for {:?}, got {:?}", mode, other),
            }
        }
    }

    #[test]
    fn test_rejects_blank_messages() {
        let tmp = TempDir::new().unwrap();
        for message in ["", "   ", "\n\t "] {
            let mut req = request(tmp.path());
            req.message = message.to_string();
            assert!(matches!(validate(&req), Err(EaselError::EmptyMessage)));
        }

        let mut req = request(tmp.path());
        req.message = "  x  ".to_string();
        assert_eq!(validate(&req).unwrap().message(), "  x  ");
    }

    #[test]
    fn test_timeout_rules() {
        let tmp = TempDir::new().unwrap();

        let config = validate(&request(tmp.path())).unwrap();
        assert_eq!(config.timeout_secs(), 1800);

        let config = validate(&request(tmp.path()).with_timeout(30)).unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(30));

        for bad in ["0", "-5", "abc", "", "1.5"] {
            let req = request(tmp.path()).with_timeout(bad);
            assert!(
                matches!(validate(&req), Err(EaselError::InvalidTimeout(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_rejects_malformed_model() {
        let tmp = TempDir::new().unwrap();
        let mut req = request(tmp.path());
        req.model = "gpt-4".to_string();
        assert!(matches!(validate(&req), Err(EaselError::InvalidModel(_))));
    }

    #[test]
    fn test_creates_missing_workspace_idempotently() {
        let tmp = TempDir::new().unwrap();
        let ws = tmp.path().join("ws1");

        let first = validate(&request(&ws)).unwrap();
        assert!(ws.join(".easel").is_dir());
        let second = validate(&request(&ws)).unwrap();
        assert_eq!(first.layout(), second.layout());
    }

    #[test]
    fn test_invalid_input_does_not_create_workspace() {
        let tmp = TempDir::new().unwrap();
        let ws = tmp.path().join("never");
        let mut req = request(&ws);
        req.mode = "nope".to_string();

        assert!(validate(&req).is_err());
        assert!(!ws.exists());
    }

    #[test]
    fn test_rejects_empty_workspace() {
        let req = RunRequest::new("  ", "openai/gpt-4", "ask", "hi");
        assert!(matches!(validate(&req), Err(EaselError::WorkspaceInit { .. })));
    }

    #[test]
    fn test_rejects_file_as_workspace() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            validate(&request(&file)),
            Err(EaselError::WorkspaceInit { .. })
        ));
    }

    #[test]
    fn test_verbose_flag_is_carried() {
        let tmp = TempDir::new().unwrap();
        let config = validate(&request(tmp.path()).with_verbose(true)).unwrap();
        assert!(config.verbose());
    }
}
