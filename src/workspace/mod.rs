//! Workspace layout management
//!
//! Creates and inspects the `.easel` metadata directory an agent workspace
//! carries. Initialization is idempotent and never overwrites existing files.

mod lock;

pub use lock::{LockMetadata, WorkspaceLock};

use crate::{EaselError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the metadata directory inside every workspace
pub const METADATA_DIR: &str = ".easel";

/// Subdirectories created under the metadata directory
const SUBDIRS: [&str; 2] = ["chat-history", "checkpoints"];

/// Default `settings.json` written into fresh workspaces
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceSettings {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub allowed_commands: Vec<String>,
}

/// Resolved locations of a workspace on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    /// Absolute path to the workspace root
    root: PathBuf,
    /// Path to the .easel directory
    metadata_dir: PathBuf,
}

impl WorkspaceLayout {
    /// Resolve the layout for a workspace path without touching the disk
    pub fn resolve(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let root = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| init_error(path, e))?
                .join(path)
        };
        let metadata_dir = root.join(METADATA_DIR);
        Ok(Self { root, metadata_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_dir(&self) -> &Path {
        &self.metadata_dir
    }

    pub fn settings_path(&self) -> PathBuf {
        self.metadata_dir.join("settings.json")
    }

    pub fn chat_history_dir(&self) -> PathBuf {
        self.metadata_dir.join("chat-history")
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.metadata_dir.join("checkpoints")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.metadata_dir.join("run.lock")
    }

    /// Read the workspace settings file
    pub fn settings(&self) -> Result<WorkspaceSettings> {
        let raw = fs::read_to_string(self.settings_path())?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Ensure the workspace directory and its metadata layout exist.
///
/// Safe to call repeatedly. A path occupied by anything other than a
/// directory is rejected rather than replaced.
pub fn ensure_layout(path: impl AsRef<Path>) -> Result<WorkspaceLayout> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(EaselError::WorkspaceInit {
            path: String::new(),
            reason: "workspace path is empty".to_string(),
        });
    }

    let layout = WorkspaceLayout::resolve(path)?;

    ensure_dir(&layout.root)?;
    ensure_dir(&layout.metadata_dir)?;
    for subdir in SUBDIRS {
        ensure_dir(&layout.metadata_dir.join(subdir))?;
    }

    let settings_path = layout.settings_path();
    if !settings_path.exists() {
        let name = layout
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());
        let settings = WorkspaceSettings {
            name,
            description: "Workspace created by easel".to_string(),
            allowed_commands: Vec::new(),
        };
        let json = serde_json::to_string_pretty(&settings)?;
        fs::write(&settings_path, json).map_err(|e| init_error(&settings_path, e))?;
        tracing::debug!("Created default settings at {:?}", settings_path);
    }

    Ok(layout)
}

/// Create `dir` if missing; fail if something that is not a directory is there
fn ensure_dir(dir: &Path) -> Result<()> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(EaselError::WorkspaceInit {
            path: dir.display().to_string(),
            reason: "path exists but is not a directory".to_string(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|e| init_error(dir, e))?;
            tracing::debug!("Created {:?}", dir);
            Ok(())
        }
        Err(e) => Err(init_error(dir, e)),
    }
}

fn init_error(path: &Path, err: io::Error) -> EaselError {
    EaselError::WorkspaceInit {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}
