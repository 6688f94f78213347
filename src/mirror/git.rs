//! Git operations using a hybrid CLI + libgit2 approach.
//!
//! **CLI (with hardening) for operations that touch the network:**
//! - `clone_shallow` - needs `--depth=1` for bandwidth/disk savings
//! - `pull` - fast-forwards the working tree and reports what changed
//!
//! **libgit2 for read operations:**
//! - `open_repository` - clean API for opening existing repos
//! - `head_commit` - resolves the revision the working tree is at

use git2::Repository;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use thiserror::Error;

/// Errors returned by git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// libgit2 reported an error.
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
    /// Repository path does not contain a git repo.
    #[error("repository not found at {0}")]
    NotFound(String),
    /// Output parsing or unexpected git data.
    #[error("failed to parse git data: {0}")]
    ParseError(String),
    /// Clone failed.
    #[error("clone failed: {0}")]
    CloneError(String),
    /// Pull failed.
    #[error("pull failed: {0}")]
    PullError(String),
    /// Underlying IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid inputs were provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Validate that a remote URL is safe to hand to `git clone`.
///
/// Rejects:
/// - Empty strings
/// - Strings starting with `-` (could be interpreted as flags)
/// - Strings containing null bytes or control characters
fn validate_remote(url: &str) -> Result<(), GitError> {
    if url.is_empty() {
        return Err(GitError::InvalidInput("remote cannot be empty".to_string()));
    }
    if url.starts_with('-') {
        return Err(GitError::InvalidInput(
            "remote cannot start with '-'".to_string(),
        ));
    }
    if url.bytes().any(|b| b < 0x20 || b == 0x7f) {
        return Err(GitError::InvalidInput(
            "remote cannot contain null or control characters".to_string(),
        ));
    }
    Ok(())
}

fn path_str<'a>(path: &'a Path, what: &str) -> Result<&'a str, GitError> {
    path.to_str()
        .ok_or_else(|| GitError::ParseError(format!("{} path is not valid UTF-8", what)))
}

/// stdout followed by stderr, the way a terminal would show them.
fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

/// Git CLI wrapper with security hardening.
pub struct GitCli {
    git_path: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    /// Create a new GitCli instance using the system git.
    pub fn new() -> Self {
        Self {
            git_path: "git".into(),
        }
    }

    /// Create a hardened Command with security settings.
    ///
    /// Applies:
    /// - `GIT_LFS_SKIP_SMUDGE=1` - skip LFS file downloads
    /// - `GIT_TERMINAL_PROMPT=0` - disable interactive prompts
    /// - `core.hooksPath=` - disable hooks execution
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.git_path);
        cmd.env("GIT_LFS_SKIP_SMUDGE", "1");
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.args(["-c", "core.hooksPath="]);
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Check whether the git binary can be executed at all.
    pub fn is_available(&self) -> bool {
        self.command()
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Clone `url` into `dest` with only the latest commit.
    ///
    /// A failed clone removes whatever partial directory it left behind, so
    /// the next attempt starts from scratch.
    pub fn clone_shallow(&self, url: &str, dest: &Path) -> Result<(), GitError> {
        validate_remote(url)?;

        let dest_existed = dest.exists();

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let dest_str = path_str(dest, "destination")?;

        let output = self
            .command()
            .args(["clone", "--depth=1", "--"])
            .arg(url)
            .arg(dest_str)
            .output()?;

        if !output.status.success() {
            if !dest_existed {
                let _ = std::fs::remove_dir_all(dest);
            }
            return Err(GitError::CloneError(combined_output(&output)));
        }

        Ok(())
    }

    /// Run `git pull` inside an existing working tree.
    ///
    /// Returns the combined command output (e.g. "Already up to date.").
    pub fn pull(&self, repo_path: &Path) -> Result<String, GitError> {
        let repo_str = path_str(repo_path, "repository")?;

        let output = self
            .command()
            .arg("-C")
            .arg(repo_str)
            .args(["pull", "--ff-only"])
            .output()?;

        let text = combined_output(&output);
        if !output.status.success() {
            return Err(GitError::PullError(text));
        }

        Ok(text)
    }
}

/// Open an existing repository at the given path.
pub fn open_repository(path: &Path) -> Result<Repository, GitError> {
    let repo = Repository::open(path).map_err(|e| {
        if e.code() == git2::ErrorCode::NotFound {
            GitError::NotFound(path.display().to_string())
        } else {
            GitError::Git(e)
        }
    })?;
    Ok(repo)
}

/// Resolve the commit SHA that HEAD points at.
pub fn head_commit(repo: &Repository) -> Result<String, GitError> {
    let head = repo.head()?;
    let commit = head.peel_to_commit()?;
    Ok(commit.id().to_string())
}
