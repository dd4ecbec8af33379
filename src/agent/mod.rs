//! Agent vocabulary: behavioral modes and model identifiers
//!
//! Both are opaque to the runner beyond their syntax; the agent engine
//! decides what a mode or a model actually means.

use crate::{EaselError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Behavioral profile selected for one execution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Code,
    Ask,
    Architect,
    Plan,
    Debug,
}

impl Mode {
    /// Every recognized mode, in display order
    pub const ALL: [Mode; 5] = [Mode::Code, Mode::Ask, Mode::Architect, Mode::Plan, Mode::Debug];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Code => "code",
            Mode::Ask => "ask",
            Mode::Architect => "architect",
            Mode::Plan => "plan",
            Mode::Debug => "debug",
        }
    }

    /// One-line description shown by `easel modes`
    pub fn description(self) -> &'static str {
        match self {
            Mode::Code => "Write and modify code in the workspace",
            Mode::Ask => "Answer questions without changing files",
            Mode::Architect => "Design systems and produce technical plans",
            Mode::Plan => "Explore the workspace and break work into steps",
            Mode::Debug => "Diagnose failures and propose fixes",
        }
    }

    /// Comma-separated list of accepted names, for error messages
    pub fn accepted() -> String {
        Self::ALL
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mode {
    type Err = EaselError;

    /// Exact, case-sensitive match
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| EaselError::InvalidMode {
                value: s.to_string(),
                accepted: Self::accepted(),
            })
    }
}

/// A `<provider>/<model-name>` identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct ModelId {
    provider: String,
    name: String,
}

impl ModelId {
    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for ModelId {
    type Err = EaselError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || EaselError::InvalidModel(s.to_string());

        if s.trim() != s || s.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        // Model names may themselves contain '/', e.g. `openrouter/meta/llama-3`
        let (provider, name) = s.split_once('/').ok_or_else(invalid)?;
        if provider.is_empty() || name.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            provider: provider.to_string(),
            name: name.to_string(),
        })
    }
}

impl TryFrom<String> for ModelId {
    type Error = EaselError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ModelId> for String {
    fn from(id: ModelId) -> Self {
        id.to_string()
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.name)
    }
}
