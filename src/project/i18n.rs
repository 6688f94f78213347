//! Localization block computation.
//!
//! A project's `i18n` mapping starts from the first entry of
//! `config/i18n_defaults.json` whose pattern matches the project path, then
//! the project's own `i18n.json` (if any) replaces individual top-level keys.
//! Entry order in the defaults file is significant and is preserved by
//! decoding into an insertion-ordered map.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use globset::GlobBuilder;
use serde_json::{Map, Value};

use super::LoadError;
use crate::types::ProjectPath;

fn malformed(path: &Path, reason: impl Into<String>) -> LoadError {
    LoadError::MetadataMalformed {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Read a JSON object file; `Ok(None)` when the file does not exist.
fn read_json_object(path: &Path) -> Result<Option<Map<String, Value>>, LoadError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(LoadError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(object)) => Ok(Some(object)),
        Ok(_) => Err(malformed(path, "expected a JSON object")),
        Err(e) => Err(malformed(path, e.to_string())),
    }
}

/// Ordered pattern -> default i18n mapping table.
#[derive(Debug, Default)]
pub struct I18nDefaults {
    source: PathBuf,
    entries: Map<String, Value>,
}

impl I18nDefaults {
    /// Load the defaults table. A missing file yields an empty table.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let entries = read_json_object(path)?.unwrap_or_default();
        Ok(Self {
            source: path.to_path_buf(),
            entries,
        })
    }

    /// Number of patterns in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no patterns.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Defaults of the first pattern matching `project`, or an empty mapping.
    ///
    /// Patterns are shell-style wildcards matched against the project path
    /// with a leading separator; `*` also matches `/`.
    pub fn resolve(&self, project: &ProjectPath) -> Result<Map<String, Value>, LoadError> {
        for (pattern, values) in &self.entries {
            if !pattern_matches(pattern, project) {
                continue;
            }
            log::debug!("{} matches i18n default pattern {}", project, pattern);
            return match values {
                Value::Object(object) => Ok(object.clone()),
                _ => Err(malformed(
                    &self.source,
                    format!("defaults for pattern '{}' are not an object", pattern),
                )),
            };
        }
        Ok(Map::new())
    }
}

// Only `*`, `?` and `[...]` are special; braces match themselves.
fn pattern_matches(pattern: &str, project: &ProjectPath) -> bool {
    let escaped = pattern.replace('{', "\\{").replace('}', "\\}");
    let glob = GlobBuilder::new(&format!("/{}", escaped))
        .literal_separator(false)
        .backslash_escape(true)
        .build();

    match glob {
        Ok(glob) => glob.compile_matcher().is_match(project.as_str()),
        Err(e) => {
            log::warn!("Skipping invalid i18n default pattern '{}': {}", pattern, e);
            false
        }
    }
}

/// Read a project's override file, if it has one.
pub fn load_override(path: &Path) -> Result<Option<Map<String, Value>>, LoadError> {
    read_json_object(path)
}

/// Shallow merge: each top-level key of `overrides` replaces the same key of
/// `base`. Nested objects are replaced wholesale, never merged.
pub fn merge(mut base: Map<String, Value>, overrides: Map<String, Value>) -> Map<String, Value> {
    for (key, value) in overrides {
        log::debug!("  override {} ~~> {}", key, value);
        base.insert(key, value);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(object) => object,
            _ => panic!("expected object"),
        }
    }

    fn project(path: &str) -> ProjectPath {
        path.parse().unwrap()
    }

    fn defaults_from(text: &str) -> I18nDefaults {
        let dir = tempdir().unwrap();
        let file = dir.path().join("i18n_defaults.json");
        std::fs::write(&file, text).unwrap();
        I18nDefaults::load(&file).unwrap()
    }

    #[test]
    fn missing_defaults_file_is_empty() {
        let dir = tempdir().unwrap();
        let defaults = I18nDefaults::load(&dir.path().join("absent.json")).unwrap();
        assert!(defaults.is_empty());
        assert!(defaults.resolve(&project("/kde/krita")).unwrap().is_empty());
    }

    #[test]
    fn malformed_defaults_file_is_an_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("i18n_defaults.json");
        std::fs::write(&file, "{ not json").unwrap();
        assert!(matches!(
            I18nDefaults::load(&file),
            Err(LoadError::MetadataMalformed { .. })
        ));

        std::fs::write(&file, "[1, 2]").unwrap();
        assert!(matches!(
            I18nDefaults::load(&file),
            Err(LoadError::MetadataMalformed { .. })
        ));
    }

    #[test]
    fn star_matches_across_separators() {
        let defaults = defaults_from(r#"{"*/krita": {"stable": "none"}}"#);
        assert_eq!(
            defaults.resolve(&project("/extragear/graphics/krita")).unwrap(),
            object(json!({"stable": "none"}))
        );
        assert!(defaults.resolve(&project("/krita")).unwrap().is_empty());
        assert!(defaults.resolve(&project("/kde/kritax")).unwrap().is_empty());
    }

    #[test]
    fn first_declared_pattern_wins() {
        let defaults = defaults_from(
            r#"{
                "kde/*": {"trunk": "generic"},
                "kde/workspace/*": {"trunk": "specific"}
            }"#,
        );
        assert_eq!(defaults.len(), 2);
        assert_eq!(
            defaults.resolve(&project("/kde/workspace/plasma")).unwrap(),
            object(json!({"trunk": "generic"}))
        );
    }

    #[test]
    fn order_follows_file_not_key_sort() {
        let defaults = defaults_from(
            r#"{
                "z*": {"trunk": "from-z"},
                "*": {"trunk": "catch-all"}
            }"#,
        );
        assert_eq!(
            defaults.resolve(&project("/zanshin")).unwrap(),
            object(json!({"trunk": "from-z"}))
        );
        assert_eq!(
            defaults.resolve(&project("/amarok")).unwrap(),
            object(json!({"trunk": "catch-all"}))
        );
    }

    #[test]
    fn character_classes_and_question_mark() {
        let defaults = defaults_from(r#"{"kf[56]/?olid": {"trunk_kf5": "master"}}"#);
        assert!(!defaults.resolve(&project("/kf5/solid")).unwrap().is_empty());
        assert!(defaults.resolve(&project("/kf4/solid")).unwrap().is_empty());
    }

    #[test]
    fn braces_are_literal() {
        let defaults = defaults_from(r#"{"kde/{a,b}": {"trunk": "master"}}"#);
        assert!(defaults.resolve(&project("/kde/a")).unwrap().is_empty());
        assert!(defaults.resolve(&project("/kde/b")).unwrap().is_empty());
        assert_eq!(
            defaults.resolve(&project("/kde/{a,b}")).unwrap(),
            object(json!({"trunk": "master"}))
        );
    }

    #[test]
    fn non_object_defaults_for_matched_pattern_is_malformed() {
        let defaults = defaults_from(r#"{"*": "none"}"#);
        assert!(matches!(
            defaults.resolve(&project("/a")),
            Err(LoadError::MetadataMalformed { .. })
        ));
    }

    #[test]
    fn invalid_pattern_is_skipped() {
        let defaults = defaults_from(r#"{"[": {"trunk": "broken"}, "*": {"trunk": "ok"}}"#);
        assert_eq!(
            defaults.resolve(&project("/a")).unwrap(),
            object(json!({"trunk": "ok"}))
        );
    }

    #[test]
    fn merge_overrides_per_key() {
        let merged = merge(
            object(json!({"stable": "none", "trunk": "x"})),
            object(json!({"trunk": "y"})),
        );
        assert_eq!(merged, object(json!({"stable": "none", "trunk": "y"})));
    }

    #[test]
    fn merge_is_shallow() {
        let merged = merge(
            object(json!({"branches": {"stable": "5.x", "trunk": "master"}})),
            object(json!({"branches": {"trunk": "main"}})),
        );
        assert_eq!(merged, object(json!({"branches": {"trunk": "main"}})));
    }

    #[test]
    fn missing_override_is_none() {
        let dir = tempdir().unwrap();
        assert!(load_override(&dir.path().join("i18n.json")).unwrap().is_none());
    }

    #[test]
    fn malformed_override_is_an_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("i18n.json");
        std::fs::write(&file, "{\"trunk\": ").unwrap();
        assert!(matches!(
            load_override(&file),
            Err(LoadError::MetadataMalformed { .. })
        ));
    }
}
