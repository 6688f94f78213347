//! Mirror directory path management
//!
//! This module provides the `MirrorPaths` struct which manages all filesystem
//! paths for the data directory layout:
//!
//! ```text
//! ~/.local/share/metamirror/
//! ├── repo-metadata/                  # Shallow clone of the remote
//! │   ├── config/
//! │   │   └── i18n_defaults.json      # Ordered pattern -> i18n defaults
//! │   └── projects/
//! │       └── <path>/
//! │           ├── metadata.yaml       # Project record source
//! │           └── i18n.json           # Optional i18n override
//! └── repo-metadata.lock              # flock-based refresh lock
//! ```
//!
//! The layout inside `repo-metadata/` belongs to the upstream repository
//! format and must not change.

use std::path::{Path, PathBuf};

use crate::types::ProjectPath;

const MIRROR_DIR: &str = "repo-metadata";
const LOCK_FILE: &str = "repo-metadata.lock";

/// Manages all filesystem paths for the data directory layout
#[derive(Debug, Clone)]
pub struct MirrorPaths {
    root: PathBuf,
}

impl MirrorPaths {
    /// Creates a new MirrorPaths with the specified root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root data directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the clone directory: `{root}/repo-metadata`
    pub fn mirror_dir(&self) -> PathBuf {
        self.root.join(MIRROR_DIR)
    }

    /// Returns the refresh lock path: `{root}/repo-metadata.lock`
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Returns the project tree: `{root}/repo-metadata/projects`
    pub fn projects_dir(&self) -> PathBuf {
        self.mirror_dir().join("projects")
    }

    /// Returns the i18n defaults file: `{root}/repo-metadata/config/i18n_defaults.json`
    pub fn i18n_defaults_file(&self) -> PathBuf {
        self.mirror_dir().join("config").join("i18n_defaults.json")
    }

    /// Returns the directory of a project: `{root}/repo-metadata/projects/{path}`
    pub fn project_dir(&self, path: &ProjectPath) -> PathBuf {
        let mut dir = self.projects_dir();
        for segment in path.segments() {
            dir.push(segment);
        }
        dir
    }

    /// Returns a project's metadata file: `{project_dir}/metadata.yaml`
    pub fn metadata_file(&self, path: &ProjectPath) -> PathBuf {
        self.project_dir(path).join("metadata.yaml")
    }

    /// Returns a project's i18n override file: `{project_dir}/i18n.json`
    pub fn i18n_override_file(&self, path: &ProjectPath) -> PathBuf {
        self.project_dir(path).join("i18n.json")
    }
}

impl Default for MirrorPaths {
    /// Creates a MirrorPaths using the system data directory + "metamirror"
    ///
    /// Uses `dirs::data_dir()` which resolves to:
    /// - Linux: `~/.local/share`
    /// - macOS: `~/Library/Application Support`
    fn default() -> Self {
        match dirs::data_dir() {
            Some(dir) => Self::new(dir.join("metamirror")),
            None => Self::new(".metamirror"),
        }
    }
}
