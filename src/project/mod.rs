//! Project records built from the mirror's metadata files.

mod i18n;
mod loader;
mod normalize;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::PathError;

pub use i18n::{I18nDefaults, load_override, merge};
pub use loader::ProjectLoader;
pub use normalize::{NormalizeError, yaml_to_json};

/// Key under which the localization block is attached.
pub const I18N_KEY: &str = "i18n";

/// Errors returned while constructing a project record.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The path does not satisfy the project path contract.
    #[error("invalid project path: {0}")]
    InvalidPath(#[from] PathError),
    /// No metadata file exists for the path.
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    /// Metadata, defaults or override file could not be decoded.
    #[error("malformed metadata in {}: {reason}", path.display())]
    MetadataMalformed { path: PathBuf, reason: String },
    /// Reading a file failed for a reason other than absence.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A project's metadata as served to clients.
///
/// Ordered string-keyed JSON mapping that always carries an `i18n` object.
/// Shared behind `Arc` once cached; never modified after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectRecord(Map<String, Value>);

impl ProjectRecord {
    /// Build a record from its metadata fields and computed i18n block.
    pub fn new(mut fields: Map<String, Value>, i18n: Map<String, Value>) -> Self {
        fields.insert(I18N_KEY.to_string(), Value::Object(i18n));
        Self(fields)
    }

    /// Look up a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The localization block.
    pub fn i18n(&self) -> Option<&Map<String, Value>> {
        self.0.get(I18N_KEY).and_then(Value::as_object)
    }

    /// All top-level fields in document order.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}
