//! Search the mirror's project tree.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::cache::PathCache;
use crate::project::LoadError;

#[derive(Debug, thiserror::Error)]
pub enum FindError {
    #[error("failed to walk {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Filters for `find`; an unset filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindQuery {
    /// Project directory name.
    pub id: Option<String>,
    /// Value of the record's `repopath` field.
    pub repopath: Option<String>,
}

impl FindQuery {
    fn matches_id(&self, name: &str) -> bool {
        self.id.as_deref().is_none_or(|id| id == name)
    }
}

/// Return the relative paths of all projects matching `query`, in lexical
/// walk order.
///
/// A directory is a project if it holds a metadata file. Records needed for
/// the `repopath` filter are loaded through `cache`.
pub fn find(cache: &PathCache, query: &FindQuery) -> Result<Vec<String>, FindError> {
    let root = cache.loader().paths().projects_dir();
    let mut found = Vec::new();
    walk(cache, query, &root, "", &mut found)?;
    Ok(found)
}

fn walk(
    cache: &PathCache,
    query: &FindQuery,
    dir: &Path,
    relative: &str,
    found: &mut Vec<String>,
) -> Result<(), FindError> {
    let io_err = |source| FindError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut children = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.file_type().map_err(io_err)?.is_dir() {
            children.push(entry.file_name());
        }
    }
    children.sort();

    for name in children {
        let Some(name) = name.to_str() else {
            log::debug!("Skipping non UTF-8 directory in {}", dir.display());
            continue;
        };
        let path = dir.join(name);
        let child = if relative.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", relative, name)
        };

        if path.join("metadata.yaml").is_file()
            && query.matches_id(name)
            && matches_repopath(cache, query, &child)?
        {
            found.push(child.clone());
        }

        walk(cache, query, &path, &child, found)?;
    }

    Ok(())
}

fn matches_repopath(cache: &PathCache, query: &FindQuery, project: &str) -> Result<bool, FindError> {
    let Some(wanted) = query.repopath.as_deref() else {
        return Ok(true);
    };
    let record = cache.get(project)?;
    Ok(matches!(record.get("repopath"), Some(Value::String(repopath)) if repopath == wanted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::MirrorPaths;
    use crate::project::ProjectLoader;
    use tempfile::{TempDir, tempdir};

    fn setup() -> (TempDir, PathCache) {
        let dir = tempdir().unwrap();
        let cache = PathCache::new(ProjectLoader::new(MirrorPaths::new(dir.path())));
        let projects = cache.loader().paths().projects_dir();
        for (project, repopath) in [
            ("kde/workspace/plasma-desktop", "plasma/plasma-desktop"),
            ("kde/applications/kate", "utilities/kate"),
            ("extragear/graphics/krita", "graphics/krita"),
            ("playground/krita", "playground/krita"),
        ] {
            let project_dir = projects.join(project);
            std::fs::create_dir_all(&project_dir).unwrap();
            std::fs::write(
                project_dir.join("metadata.yaml"),
                format!("repopath: {}\n", repopath),
            )
            .unwrap();
        }
        (dir, cache)
    }

    #[test]
    fn lists_all_projects_in_lexical_order() {
        let (_dir, cache) = setup();
        let found = find(&cache, &FindQuery::default()).unwrap();

        assert_eq!(
            found,
            vec![
                "extragear/graphics/krita",
                "kde/applications/kate",
                "kde/workspace/plasma-desktop",
                "playground/krita",
            ]
        );
        // Without a repopath filter nothing is loaded.
        assert_eq!(cache.stats().loads, 0);
    }

    #[test]
    fn filters_by_id() {
        let (_dir, cache) = setup();
        let query = FindQuery {
            id: Some("krita".to_string()),
            ..FindQuery::default()
        };

        assert_eq!(
            find(&cache, &query).unwrap(),
            vec!["extragear/graphics/krita", "playground/krita"]
        );
    }

    #[test]
    fn filters_by_repopath() {
        let (_dir, cache) = setup();
        let query = FindQuery {
            repopath: Some("utilities/kate".to_string()),
            ..FindQuery::default()
        };

        assert_eq!(find(&cache, &query).unwrap(), vec!["kde/applications/kate"]);
        // Records loaded for filtering stay cached.
        assert!(cache.get("kde/applications/kate").is_ok());
        assert!(cache.stats().hits >= 1);
    }

    #[test]
    fn combined_filters() {
        let (_dir, cache) = setup();
        let query = FindQuery {
            id: Some("krita".to_string()),
            repopath: Some("graphics/krita".to_string()),
        };

        assert_eq!(
            find(&cache, &query).unwrap(),
            vec!["extragear/graphics/krita"]
        );
    }

    #[test]
    fn no_match_is_empty() {
        let (_dir, cache) = setup();
        let query = FindQuery {
            id: Some("nothing".to_string()),
            ..FindQuery::default()
        };

        assert!(find(&cache, &query).unwrap().is_empty());
    }

    #[test]
    fn malformed_record_propagates() {
        let (_dir, cache) = setup();
        let broken = cache.loader().paths().projects_dir().join("broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join("metadata.yaml"), "repopath: [\n").unwrap();

        let query = FindQuery {
            repopath: Some("x".to_string()),
            ..FindQuery::default()
        };
        assert!(matches!(
            find(&cache, &query),
            Err(FindError::Load(LoadError::MetadataMalformed { .. }))
        ));
    }

    #[test]
    fn missing_tree_is_an_error() {
        let dir = tempdir().unwrap();
        let cache = PathCache::new(ProjectLoader::new(MirrorPaths::new(dir.path())));

        assert!(matches!(
            find(&cache, &FindQuery::default()),
            Err(FindError::Io { .. })
        ));
    }
}
