//! Lazily populated path -> record cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::project::{LoadError, ProjectLoader, ProjectRecord};
use crate::types::ProjectPath;

struct Entries {
    records: HashMap<String, Arc<ProjectRecord>>,
    /// Bumped by every wipe; a load that started in an older epoch must not
    /// write back.
    epoch: u64,
}

enum Lookup {
    Hit(Arc<ProjectRecord>),
    Miss { epoch: u64 },
}

/// Hit/miss counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub loads: u64,
    pub wipes: u64,
}

/// Cache of constructed project records keyed by the path they were
/// requested under.
///
/// Every record is stored under the path as given and under its
/// leading-separator form, so `a/b` and `/a/b` share entries. A wipe clears
/// everything at once.
pub struct PathCache {
    loader: ProjectLoader,
    entries: RwLock<Entries>,
    hits: AtomicU64,
    loads: AtomicU64,
    wipes: AtomicU64,
}

impl PathCache {
    /// Create an empty cache that fills itself through `loader`.
    pub fn new(loader: ProjectLoader) -> Self {
        Self {
            loader,
            entries: RwLock::new(Entries {
                records: HashMap::new(),
                epoch: 0,
            }),
            hits: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            wipes: AtomicU64::new(0),
        }
    }

    /// Return the loader backing this cache.
    pub fn loader(&self) -> &ProjectLoader {
        &self.loader
    }

    // The map is only ever changed by single insert/clear calls, so a
    // poisoned lock still guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the record for `path`, constructing it on a miss.
    ///
    /// Failed loads are not cached; the loader's error is returned as is.
    pub fn get(&self, path: &str) -> Result<Arc<ProjectRecord>, LoadError> {
        let project: ProjectPath = path.parse()?;

        let epoch = match self.lookup(path, project.as_str()) {
            Lookup::Hit(record) => return Ok(record),
            Lookup::Miss { epoch } => epoch,
        };

        // Load without holding the lock; disk reads can be slow.
        let record = self.load(&project)?;
        self.store_if_current(epoch, path, project.as_str(), &record);
        Ok(record)
    }

    fn lookup(&self, path: &str, alias: &str) -> Lookup {
        let entries = self.read();
        let cached = entries
            .records
            .get(path)
            .or_else(|| entries.records.get(alias));
        match cached {
            Some(record) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Lookup::Hit(Arc::clone(record))
            }
            None => Lookup::Miss {
                epoch: entries.epoch,
            },
        }
    }

    fn load(&self, project: &ProjectPath) -> Result<Arc<ProjectRecord>, LoadError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(self.loader.load_project(project)?))
    }

    /// Insert `record` under both keys unless a wipe happened since `epoch`.
    fn store_if_current(
        &self,
        epoch: u64,
        path: &str,
        alias: &str,
        record: &Arc<ProjectRecord>,
    ) -> bool {
        let mut entries = self.write();
        if entries.epoch != epoch {
            log::debug!("Cache wiped while loading {}, not storing", alias);
            return false;
        }
        entries.records.insert(path.to_string(), Arc::clone(record));
        entries.records.insert(alias.to_string(), Arc::clone(record));
        true
    }

    /// Drop every cached record.
    pub fn wipe(&self) {
        let mut entries = self.write();
        let dropped = entries.records.len();
        entries.records.clear();
        entries.epoch += 1;
        self.wipes.fetch_add(1, Ordering::Relaxed);
        log::info!("Reset cache ({} entries dropped)", dropped);
    }

    /// Number of cached keys (each record counts once per key).
    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counters since creation.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            wipes: self.wipes.load(Ordering::Relaxed),
        }
    }
}
