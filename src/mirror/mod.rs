//! Local mirror of the metadata repository
//!
//! The mirror is a shallow clone that is only ever fast-forwarded. Network
//! operations shell out to git; revision queries go through libgit2.

mod git;
mod lock;
mod paths;

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

pub use git::{GitCli, GitError, head_commit, open_repository};
pub use lock::{DEFAULT_LOCK_TIMEOUT, MirrorLock};
pub use paths::MirrorPaths;

/// Default remote the mirror is cloned from.
pub const DEFAULT_REMOTE: &str = "https://invent.kde.org/sysadmin/repo-metadata.git";

/// Errors returned by mirror operations.
///
/// Cloneable so a single refresh outcome can be handed to every caller that
/// waited on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    /// Clone, pull or the refresh lock failed.
    #[error("mirror unavailable: {0}")]
    Unavailable(String),
    /// The mirror's current revision cannot be determined.
    #[error("mirror revision unknown: {0}")]
    RevisionUnknown(String),
}

/// Operations on the on-disk mirror.
pub trait MirrorStore: Send + Sync {
    /// Clone the remote if the mirror directory does not exist yet.
    fn ensure_cloned(&self) -> Result<(), MirrorError>;

    /// Update the mirror to the latest remote state, returning the raw
    /// command output.
    fn pull(&self) -> Result<String, MirrorError>;

    /// Opaque identifier of the mirror's current content.
    fn current_revision(&self) -> Result<String, MirrorError>;

    /// Lock held for the duration of a refresh, if the store shares its
    /// directory with other processes.
    fn refresh_lock(&self) -> Result<Option<MirrorLock>, MirrorError> {
        Ok(None)
    }
}

/// Git-backed mirror living under a data directory.
pub struct GitMirror {
    paths: MirrorPaths,
    remote: String,
    git: GitCli,
    lock_timeout: Duration,
}

impl GitMirror {
    /// Create a mirror of `remote` rooted at the provided paths.
    pub fn new(paths: MirrorPaths, remote: impl Into<String>) -> Self {
        Self {
            paths,
            remote: remote.into(),
            git: GitCli::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Set how long a refresh waits for another process' refresh.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    fn mirror_dir_exists(dir: &Path) -> bool {
        std::fs::symlink_metadata(dir).is_ok()
    }
}

impl MirrorStore for GitMirror {
    fn ensure_cloned(&self) -> Result<(), MirrorError> {
        let dir = self.paths.mirror_dir();
        if Self::mirror_dir_exists(&dir) {
            return Ok(());
        }

        log::info!("Cloning {} into {}", self.remote, dir.display());
        self.git
            .clone_shallow(&self.remote, &dir)
            .map_err(|e| MirrorError::Unavailable(e.to_string()))
    }

    fn pull(&self) -> Result<String, MirrorError> {
        self.git
            .pull(&self.paths.mirror_dir())
            .map_err(|e| MirrorError::Unavailable(e.to_string()))
    }

    fn current_revision(&self) -> Result<String, MirrorError> {
        let repo = open_repository(&self.paths.mirror_dir())
            .map_err(|e| MirrorError::RevisionUnknown(e.to_string()))?;
        head_commit(&repo).map_err(|e| MirrorError::RevisionUnknown(e.to_string()))
    }

    fn refresh_lock(&self) -> Result<Option<MirrorLock>, MirrorError> {
        MirrorLock::acquire(&self.paths.lock_path(), self.lock_timeout)
            .map(Some)
            .map_err(|e| MirrorError::Unavailable(format!("refresh lock: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn current_revision_unknown_without_clone() {
        let dir = tempdir().unwrap();
        let mirror = GitMirror::new(MirrorPaths::new(dir.path()), DEFAULT_REMOTE);

        assert!(matches!(
            mirror.current_revision(),
            Err(MirrorError::RevisionUnknown(_))
        ));
    }

    #[test]
    fn current_revision_unknown_for_plain_directory() {
        let dir = tempdir().unwrap();
        let paths = MirrorPaths::new(dir.path());
        std::fs::create_dir_all(paths.mirror_dir()).unwrap();
        let mirror = GitMirror::new(paths, DEFAULT_REMOTE);

        assert!(matches!(
            mirror.current_revision(),
            Err(MirrorError::RevisionUnknown(_))
        ));
    }

    #[test]
    fn ensure_cloned_skips_existing_directory() {
        let dir = tempdir().unwrap();
        let paths = MirrorPaths::new(dir.path());
        std::fs::create_dir_all(paths.mirror_dir()).unwrap();
        // An unusable remote proves no clone is attempted.
        let mirror = GitMirror::new(paths, "-not-a-remote");

        assert_eq!(mirror.ensure_cloned(), Ok(()));
    }

    #[test]
    fn ensure_cloned_reports_unavailable() {
        let dir = tempdir().unwrap();
        let mirror = GitMirror::new(MirrorPaths::new(dir.path()), "-not-a-remote");

        assert!(matches!(
            mirror.ensure_cloned(),
            Err(MirrorError::Unavailable(_))
        ));
    }

    #[test]
    fn pull_without_clone_is_unavailable() {
        let dir = tempdir().unwrap();
        let mirror = GitMirror::new(MirrorPaths::new(dir.path()), DEFAULT_REMOTE);

        assert!(matches!(mirror.pull(), Err(MirrorError::Unavailable(_))));
    }

    #[test]
    fn refresh_lock_times_out_when_held() {
        let dir = tempdir().unwrap();
        let paths = MirrorPaths::new(dir.path());
        let _held = MirrorLock::try_acquire(&paths.lock_path()).unwrap().unwrap();
        let mirror =
            GitMirror::new(paths, DEFAULT_REMOTE).with_lock_timeout(Duration::from_millis(20));

        assert!(matches!(
            mirror.refresh_lock(),
            Err(MirrorError::Unavailable(_))
        ));
    }
}
