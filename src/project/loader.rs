//! Construction of project records from the mirror.

use std::io::ErrorKind;

use serde_json::{Map, Value};

use super::i18n::{I18nDefaults, load_override, merge};
use super::normalize::yaml_to_json;
use super::{LoadError, ProjectRecord};
use crate::mirror::MirrorPaths;
use crate::types::ProjectPath;

/// Reads a project's files out of the mirror and assembles its record.
///
/// Nothing is cached here: every call reads the metadata, the defaults table
/// and the override file from disk.
#[derive(Debug, Clone)]
pub struct ProjectLoader {
    paths: MirrorPaths,
}

impl ProjectLoader {
    /// Create a loader reading from the mirror under `paths`.
    pub fn new(paths: MirrorPaths) -> Self {
        Self { paths }
    }

    /// Return the paths this loader reads from.
    pub fn paths(&self) -> &MirrorPaths {
        &self.paths
    }

    /// Load the project at `path`, which must start with `/`.
    pub fn load(&self, path: &str) -> Result<ProjectRecord, LoadError> {
        let project = ProjectPath::parse_absolute(path)?;
        self.load_project(&project)
    }

    /// Load an already validated project path.
    pub fn load_project(&self, project: &ProjectPath) -> Result<ProjectRecord, LoadError> {
        log::debug!("Constructing project {}", project);

        let fields = self.read_metadata(project)?;

        let defaults = I18nDefaults::load(&self.paths.i18n_defaults_file())?;
        log::debug!("{} i18n default patterns loaded", defaults.len());
        let mut i18n = defaults.resolve(project)?;
        if let Some(overrides) = load_override(&self.paths.i18n_override_file(project))? {
            i18n = merge(i18n, overrides);
        }

        Ok(ProjectRecord::new(fields, i18n))
    }

    fn read_metadata(&self, project: &ProjectPath) -> Result<Map<String, Value>, LoadError> {
        let file = self.paths.metadata_file(project);
        let text = match std::fs::read_to_string(&file) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LoadError::ProjectNotFound(project.to_string()));
            }
            Err(e) => return Err(LoadError::Io { path: file, source: e }),
        };

        if text.trim().is_empty() {
            return Ok(Map::new());
        }

        let malformed = |reason: String| LoadError::MetadataMalformed {
            path: file.clone(),
            reason,
        };

        let document: serde_yaml::Value =
            serde_yaml::from_str(&text).map_err(|e| malformed(e.to_string()))?;

        match yaml_to_json(document).map_err(|e| malformed(e.to_string()))? {
            Value::Object(fields) => Ok(fields),
            Value::Null => Ok(Map::new()),
            other => Err(malformed(format!(
                "expected a mapping at the top level, found {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
