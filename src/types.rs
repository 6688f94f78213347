//! Shared types for metamirror

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for project path parsing failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("project path cannot be empty")]
    Empty,
    #[error("project path must start with '/': {0}")]
    MissingLeadingSeparator(String),
}

/// Identifying path of a project within the mirror's project tree.
///
/// Always stored in its leading-separator form (`/frameworks/solid`), which
/// is also the form the i18n default patterns are matched against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectPath(String);

impl ProjectPath {
    /// Parse a path that must already carry its leading separator.
    pub fn parse_absolute(s: &str) -> Result<Self, PathError> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        if !s.starts_with('/') {
            return Err(PathError::MissingLeadingSeparator(s.to_string()));
        }
        if s.split('/').all(str::is_empty) {
            return Err(PathError::Empty);
        }
        Ok(ProjectPath(s.to_string()))
    }

    /// Returns the path with its leading separator, e.g. `/frameworks/solid`
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the non-empty path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }
}

/// Lenient parse: a missing leading separator is added.
impl FromStr for ProjectPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('/') {
            Self::parse_absolute(s)
        } else if s.is_empty() {
            Err(PathError::Empty)
        } else {
            Self::parse_absolute(&format!("/{}", s))
        }
    }
}

impl fmt::Display for ProjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
