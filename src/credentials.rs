//! Environment and credential loading
//!
//! Runs before execution: loads a `.env` file and checks that the selected
//! provider has an API key. A missing key fails here, at configuration
//! time, instead of deep inside an agent run.

use crate::agent::ModelId;
use crate::{EaselError, Result};
use std::path::{Path, PathBuf};

/// Keys accepted for any provider
const SHARED_KEY_VARS: [&str; 2] = ["LITELLM_API_KEY", "OPENAI_API_KEY"];

/// Providers served locally, which need no key
const LOCAL_PROVIDERS: [&str; 2] = ["ollama", "lmstudio"];

/// Load the first `.env` found, looking in the workspace then the current directory.
///
/// Returns the file that was loaded, if any.
pub fn load_env_file(workspace: &Path) -> Option<PathBuf> {
    let mut candidates = vec![workspace.join(".env")];
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(".env"));
    }

    for path in candidates {
        if !path.is_file() {
            continue;
        }
        match dotenv::from_path(&path) {
            Ok(()) => {
                tracing::debug!("Loaded environment from {:?}", path);
                return Some(path);
            }
            Err(e) => tracing::warn!("Ignoring unreadable env file {:?}: {}", path, e),
        }
    }
    None
}

/// Variables that can satisfy the key requirement for `model`, in lookup order
pub fn candidate_key_vars(model: &ModelId) -> Vec<String> {
    let provider_var = format!(
        "{}_API_KEY",
        model.provider().to_ascii_uppercase().replace('-', "_")
    );
    let mut vars = vec![provider_var];
    for shared in SHARED_KEY_VARS {
        if !vars.iter().any(|v| v == shared) {
            vars.push(shared.to_string());
        }
    }
    vars
}

/// Check the process environment for a key usable with `model`.
pub fn ensure_api_key(model: &ModelId) -> Result<Option<String>> {
    ensure_api_key_with(model, |key| std::env::var(key).ok())
}

/// Check `lookup` for a key usable with `model`.
///
/// Returns the name of the variable that matched, or `None` for local
/// providers that need no key.
pub fn ensure_api_key_with(
    model: &ModelId,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<String>> {
    if LOCAL_PROVIDERS.contains(&model.provider()) {
        return Ok(None);
    }

    let candidates = candidate_key_vars(model);
    for var in &candidates {
        if lookup(var).is_some_and(|v| !v.trim().is_empty()) {
            return Ok(Some(var.clone()));
        }
    }

    Err(EaselError::MissingCredentials {
        provider: model.provider().to_string(),
        checked: candidates.join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn model(s: &str) -> ModelId {
        s.parse().unwrap()
    }

    #[test]
    fn test_provider_specific_key_wins() {
        let found = ensure_api_key_with(&model("deepseek/deepseek-chat"), |key| {
            (key == "DEEPSEEK_API_KEY" || key == "OPENAI_API_KEY").then(|| "sk".to_string())
        })
        .unwrap();
        assert_eq!(found.as_deref(), Some("DEEPSEEK_API_KEY"));
    }

    #[test]
    fn test_shared_key_is_accepted() {
        let found = ensure_api_key_with(&model("anthropic/claude"), |key| {
            (key == "LITELLM_API_KEY").then(|| "sk".to_string())
        })
        .unwrap();
        assert_eq!(found.as_deref(), Some("LITELLM_API_KEY"));
    }

    #[test]
    fn test_missing_key_is_a_configuration_error() {
        let err = ensure_api_key_with(&model("openai/gpt-4"), |_| Some("   ".to_string()))
            .unwrap_err();
        match err {
            EaselError::MissingCredentials { provider, checked } => {
                assert_eq!(provider, "openai");
                assert_eq!(checked, "OPENAI_API_KEY, LITELLM_API_KEY");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_local_providers_need_no_key() {
        assert_eq!(ensure_api_key_with(&model("ollama/llama2"), |_| None).unwrap(), None);
    }

    #[test]
    fn test_candidate_vars_normalize_provider() {
        assert_eq!(
            candidate_key_vars(&model("together-ai/mixtral")),
            vec!["TOGETHER_AI_API_KEY", "LITELLM_API_KEY", "OPENAI_API_KEY"]
        );
    }

    #[test]
    fn test_no_env_file_means_nothing_loaded() {
        let tmp = TempDir::new().unwrap();
        // The cwd may legitimately carry a .env; only assert the workspace one is not invented
        let loaded = load_env_file(tmp.path());
        assert_ne!(loaded, Some(tmp.path().join(".env")));
    }

    #[test]
    fn test_workspace_env_file_is_preferred() {
        let tmp = TempDir::new().unwrap();
        let env_path = tmp.path().join(".env");
        std::fs::write(&env_path, "EASEL_CREDENTIALS_TEST_MARKER=1\n").unwrap();

        assert_eq!(load_env_file(tmp.path()), Some(env_path));
    }
}
