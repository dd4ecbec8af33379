//! Exclusive per-workspace run lock
//!
//! One workspace hosts at most one execution at a time. The lock is a
//! `run.lock` file created with create-new semantics and removed when the
//! guard is dropped.

use super::WorkspaceLayout;
use crate::{EaselError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Metadata recorded in the lock file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockMetadata {
    pub pid: u32,
    pub model: String,
    pub mode: String,
    pub created_at: DateTime<Utc>,
    /// After this instant the holder has overrun its own deadline and the
    /// lock may be reclaimed
    pub expires_at: DateTime<Utc>,
}

impl LockMetadata {
    pub fn new(model: &str, mode: &str, ttl: std::time::Duration) -> Self {
        let created_at = Utc::now();
        let ttl = Duration::from_std(ttl).unwrap_or(Duration::MAX);
        Self {
            pid: std::process::id(),
            model: model.to_string(),
            mode: mode.to_string(),
            created_at,
            expires_at: created_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// RAII guard for the workspace run lock.
///
/// Dropping the guard removes the lock file. Failure to remove it is logged,
/// never raised.
#[derive(Debug)]
pub struct WorkspaceLock {
    path: PathBuf,
    released: bool,
}

impl WorkspaceLock {
    /// Take the run lock, reclaiming it first if the previous holder expired.
    pub fn acquire(layout: &WorkspaceLayout, metadata: &LockMetadata) -> Result<Self> {
        let path = layout.lock_path();
        match try_create(&path, metadata) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let holder = LockMetadata::from_file(&path).map_err(|read_err| {
                    EaselError::WorkspaceLocked(format!(
                        "{} exists but is unreadable ({}); remove it if no run is active",
                        path.display(),
                        read_err
                    ))
                })?;

                if !holder.is_expired(Utc::now()) {
                    return Err(EaselError::WorkspaceLocked(format!(
                        "{} is held by pid {} ({} {}) since {}",
                        layout.root().display(),
                        holder.pid,
                        holder.mode,
                        holder.model,
                        holder.created_at.to_rfc3339()
                    )));
                }

                tracing::warn!(
                    "Reclaiming stale run lock {:?} (pid {}, expired {})",
                    path,
                    holder.pid,
                    holder.expires_at.to_rfc3339()
                );
                reclaim(&path, &holder, metadata)
            }
            Err(e) => Err(EaselError::Io(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock explicitly, surfacing any error.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        fs::remove_file(&self.path)?;
        Ok(())
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::warn!("Failed to release run lock {:?}: {}", self.path, e);
            }
        }
    }
}

/// Replace the expired lock `stale`, unless another run got there first.
///
/// The file is renamed aside before anything is deleted. A rename moves one
/// specific file, so if a competing reclaimer already swapped in a fresh
/// lock, that is what lands aside; it is then linked back and left alone.
fn reclaim(path: &Path, stale: &LockMetadata, metadata: &LockMetadata) -> Result<WorkspaceLock> {
    let lost_race = |detail: String| {
        EaselError::WorkspaceLocked(format!("lost race reclaiming {}: {}", path.display(), detail))
    };

    let aside = aside_path(path);
    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return try_create(path, metadata).map_err(|e| lost_race(e.to_string()));
        }
        Err(e) => return Err(EaselError::Io(e)),
    }

    let moved = LockMetadata::from_file(&aside).ok();
    if moved.as_ref() != Some(stale) {
        if let Err(e) = fs::hard_link(&aside, path) {
            tracing::warn!("Could not restore run lock {:?}: {}", path, e);
        }
        let _ = fs::remove_file(&aside);
        return Err(lost_race("another run holds it now".to_string()));
    }

    fs::remove_file(&aside)?;
    try_create(path, metadata).map_err(|e| lost_race(e.to_string()))
}

fn aside_path(path: &Path) -> PathBuf {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".reclaim-{}-{}", std::process::id(), nanos));
    PathBuf::from(name)
}

fn try_create(path: &Path, metadata: &LockMetadata) -> io::Result<WorkspaceLock> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    // From here on the guard owns the file, so a failed write still cleans up
    let lock = WorkspaceLock {
        path: path.to_path_buf(),
        released: false,
    };
    let json = serde_json::to_string_pretty(metadata).map_err(io::Error::other)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    Ok(lock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::ensure_layout;
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    fn meta(ttl_secs: u64) -> LockMetadata {
        LockMetadata::new("openai/gpt-4", "ask", StdDuration::from_secs(ttl_secs))
    }

    #[test]
    fn test_second_acquire_is_refused_while_held() {
        let tmp = TempDir::new().unwrap();
        let layout = ensure_layout(tmp.path()).unwrap();

        let lock = WorkspaceLock::acquire(&layout, &meta(60)).unwrap();
        assert!(lock.path().exists());

        let err = WorkspaceLock::acquire(&layout, &meta(60)).unwrap_err();
        assert_eq!(err.kind(), "workspace_locked");

        drop(lock);
        assert!(!layout.lock_path().exists());
        WorkspaceLock::acquire(&layout, &meta(60)).unwrap();
    }

    #[test]
    fn test_expired_lock_is_reclaimed() {
        let tmp = TempDir::new().unwrap();
        let layout = ensure_layout(tmp.path()).unwrap();

        let mut stale = meta(60);
        stale.pid = 1;
        stale.expires_at = Utc::now() - Duration::seconds(1);
        fs::write(layout.lock_path(), serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = WorkspaceLock::acquire(&layout, &meta(60)).unwrap();
        let holder = LockMetadata::from_file(lock.path()).unwrap();
        assert_eq!(holder.pid, std::process::id());
    }

    #[test]
    fn test_reclaim_leaves_a_replaced_lock_alone() {
        let tmp = TempDir::new().unwrap();
        let layout = ensure_layout(tmp.path()).unwrap();
        let path = layout.lock_path();

        let mut stale = meta(60);
        stale.pid = 1;
        stale.expires_at = Utc::now() - Duration::seconds(1);
        // Another reclaimer already swapped in a live lock
        let mut fresh = meta(60);
        fresh.pid = 2;
        fs::write(&path, serde_json::to_string(&fresh).unwrap()).unwrap();

        let err = reclaim(&path, &stale, &meta(60)).unwrap_err();
        assert_eq!(err.kind(), "workspace_locked");
        assert_eq!(LockMetadata::from_file(&path).unwrap(), fresh);

        let leftovers: Vec<_> = fs::read_dir(layout.metadata_dir())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().contains("reclaim"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_reclaim_replaces_the_expected_stale_lock() {
        let tmp = TempDir::new().unwrap();
        let layout = ensure_layout(tmp.path()).unwrap();
        let path = layout.lock_path();

        let mut stale = meta(60);
        stale.pid = 1;
        stale.expires_at = Utc::now() - Duration::seconds(1);
        fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();
        let stale = LockMetadata::from_file(&path).unwrap();

        let lock = reclaim(&path, &stale, &meta(60)).unwrap();
        assert_eq!(LockMetadata::from_file(lock.path()).unwrap().pid, std::process::id());
    }

    #[test]
    fn test_unreadable_lock_is_not_reclaimed() {
        let tmp = TempDir::new().unwrap();
        let layout = ensure_layout(tmp.path()).unwrap();
        fs::write(layout.lock_path(), "not json").unwrap();

        let err = WorkspaceLock::acquire(&layout, &meta(60)).unwrap_err();
        assert!(matches!(err, EaselError::WorkspaceLocked(_)));
        assert!(layout.lock_path().exists());
    }

    #[test]
    fn test_explicit_release_removes_file() {
        let tmp = TempDir::new().unwrap();
        let layout = ensure_layout(tmp.path()).unwrap();

        let lock = WorkspaceLock::acquire(&layout, &meta(60)).unwrap();
        lock.release().unwrap();
        assert!(!layout.lock_path().exists());
    }
}
