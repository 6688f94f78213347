//! Single-flight mirror refresh.
//!
//! Whoever triggers a refresh while none is running becomes the leader and
//! performs clone/pull/revision check. Callers arriving while the leader is
//! busy block until it finishes and get its outcome instead of starting
//! another git run.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::cache::{PathCache, RevisionGate};
use crate::mirror::{MirrorError, MirrorStore};

/// Outcome of a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    /// Raw output of the update command.
    pub output: String,
    /// Revision the cache is now built against, if known.
    pub revision: Option<String>,
    /// Whether the cache was wiped.
    pub cache_reset: bool,
}

/// Revision the cache is built against. Only written by the revision gate.
#[derive(Debug, Default)]
struct MirrorState {
    last_known_revision: Option<String>,
}

#[derive(Default)]
struct Flight {
    running: bool,
    completed: u64,
    outcome: Option<Result<RefreshReport, MirrorError>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serializes refreshes of the mirror and tracks when the last one happened.
pub struct RefreshCoordinator {
    store: Arc<dyn MirrorStore>,
    gate: RevisionGate,
    state: Mutex<MirrorState>,
    flight: Mutex<Flight>,
    landed: Condvar,
    last_refresh: Mutex<Option<Instant>>,
}

/// Publishes the leader's outcome even if the refresh unwinds.
struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    outcome: Option<Result<RefreshReport, MirrorError>>,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| Err(MirrorError::Unavailable("refresh aborted".to_string())));
        let mut flight = lock(&self.coordinator.flight);
        flight.running = false;
        flight.completed += 1;
        flight.outcome = Some(outcome);
        self.coordinator.landed.notify_all();
    }
}

impl RefreshCoordinator {
    /// Create a coordinator refreshing `store` and invalidating `cache`.
    pub fn new(store: Arc<dyn MirrorStore>, cache: Arc<PathCache>) -> Self {
        Self {
            store,
            gate: RevisionGate::new(cache),
            state: Mutex::new(MirrorState::default()),
            flight: Mutex::new(Flight::default()),
            landed: Condvar::new(),
            last_refresh: Mutex::new(None),
        }
    }

    /// Return the mirror this coordinator refreshes.
    pub fn store(&self) -> &dyn MirrorStore {
        self.store.as_ref()
    }

    /// Clone if needed, pull, and invalidate the cache if the revision moved.
    ///
    /// Blocks for the duration of the git commands. Concurrent callers share
    /// one refresh and all receive its outcome.
    pub fn trigger_refresh(&self) -> Result<RefreshReport, MirrorError> {
        let mut flight = lock(&self.flight);
        if flight.running {
            let target = flight.completed + 1;
            while flight.completed < target {
                flight = self
                    .landed
                    .wait(flight)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            log::debug!("Joined an in-flight refresh");
            return flight.outcome.clone().unwrap_or_else(|| {
                Err(MirrorError::Unavailable("refresh outcome missing".to_string()))
            });
        }
        flight.running = true;
        drop(flight);

        let mut guard = LeaderGuard {
            coordinator: self,
            outcome: None,
        };
        let outcome = self.run_refresh();
        guard.outcome = Some(outcome.clone());
        outcome
    }

    fn run_refresh(&self) -> Result<RefreshReport, MirrorError> {
        let _lock = self.store.refresh_lock()?;

        // Logged only; the cache is compared against what it was built from.
        let before = self.store.current_revision().ok();

        self.store.ensure_cloned()?;
        let output = self.store.pull()?;
        *lock(&self.last_refresh) = Some(Instant::now());

        let mut state = lock(&self.state);
        let cache_reset = self
            .gate
            .check_and_maybe_reset(self.store.as_ref(), &mut state.last_known_revision);

        log::info!(
            "Refreshed mirror at {}: {}",
            before.as_deref().unwrap_or("<none>"),
            output.trim()
        );
        Ok(RefreshReport {
            output,
            revision: state.last_known_revision.clone(),
            cache_reset,
        })
    }

    /// Run the revision check outside of a refresh, e.g. at startup.
    pub fn check_revision(&self) -> bool {
        let mut state = lock(&self.state);
        self.gate
            .check_and_maybe_reset(self.store.as_ref(), &mut state.last_known_revision)
    }

    /// Revision the cached records were built against, if known.
    pub fn known_revision(&self) -> Option<String> {
        lock(&self.state).last_known_revision.clone()
    }

    /// Time since the last successful refresh; `Duration::MAX` if none yet.
    pub fn age(&self) -> Duration {
        self.last_refresh_at()
            .map(|at| at.elapsed())
            .unwrap_or(Duration::MAX)
    }

    /// When the last successful refresh finished pulling.
    pub fn last_refresh_at(&self) -> Option<Instant> {
        *lock(&self.last_refresh)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mirror::MirrorPaths;
    use crate::project::ProjectLoader;
    use serde_json::json;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use tempfile::{TempDir, tempdir};

    /// In-memory mirror counting how often each operation runs.
    #[derive(Default)]
    pub(crate) struct FakeStore {
        pub clones: AtomicUsize,
        pub pulls: AtomicUsize,
        pub revision: Mutex<Option<String>>,
        pub fail_pull: Mutex<Option<String>>,
        pub pull_delay: Duration,
    }

    impl FakeStore {
        pub(crate) fn with_revision(revision: &str) -> Self {
            Self {
                revision: Mutex::new(Some(revision.to_string())),
                ..Self::default()
            }
        }

        pub(crate) fn set_revision(&self, revision: &str) {
            *self.revision.lock().unwrap() = Some(revision.to_string());
        }
    }

    impl MirrorStore for FakeStore {
        fn ensure_cloned(&self) -> Result<(), MirrorError> {
            self.clones.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn pull(&self) -> Result<String, MirrorError> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.pull_delay);
            match self.fail_pull.lock().unwrap().clone() {
                Some(message) => Err(MirrorError::Unavailable(message)),
                None => Ok("Already up to date.\n".to_string()),
            }
        }

        fn current_revision(&self) -> Result<String, MirrorError> {
            self.revision
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| MirrorError::RevisionUnknown("no HEAD".to_string()))
        }
    }

    fn setup(store: FakeStore) -> (TempDir, Arc<FakeStore>, Arc<PathCache>, RefreshCoordinator) {
        let dir = tempdir().unwrap();
        let cache = Arc::new(PathCache::new(ProjectLoader::new(MirrorPaths::new(
            dir.path(),
        ))));
        let store = Arc::new(store);
        let coordinator = RefreshCoordinator::new(store.clone(), Arc::clone(&cache));
        (dir, store, cache, coordinator)
    }

    #[test]
    fn refresh_runs_clone_then_pull() {
        let (_dir, store, _cache, coordinator) = setup(FakeStore::with_revision("abc"));

        let report = coordinator.trigger_refresh().unwrap();
        assert_eq!(report.output, "Already up to date.\n");
        assert_eq!(report.revision.as_deref(), Some("abc"));
        assert_eq!(store.clones.load(Ordering::SeqCst), 1);
        assert_eq!(store.pulls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unchanged_revision_keeps_cache() {
        let (_dir, _store, cache, coordinator) = setup(FakeStore::with_revision("abc"));

        // The first refresh learns the revision, which counts as a move.
        assert!(coordinator.trigger_refresh().unwrap().cache_reset);
        let report = coordinator.trigger_refresh().unwrap();
        assert!(!report.cache_reset);
        assert_eq!(cache.stats().wipes, 1);
        assert_eq!(coordinator.known_revision().as_deref(), Some("abc"));
    }

    #[test]
    fn mirror_moved_by_another_process_wipes_cache() {
        let (dir, store, cache, coordinator) = setup(FakeStore::with_revision("abc"));
        let project = dir.path().join("repo-metadata/projects/kate");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("metadata.yaml"), "name: Old\n").unwrap();

        coordinator.trigger_refresh().unwrap();
        assert_eq!(cache.get("/kate").unwrap().get("name"), Some(&json!("Old")));

        // Someone else pulled the shared mirror between our refreshes.
        std::fs::write(project.join("metadata.yaml"), "name: New\n").unwrap();
        store.set_revision("def");

        let report = coordinator.trigger_refresh().unwrap();
        assert!(report.cache_reset);
        assert_eq!(report.revision.as_deref(), Some("def"));
        assert_eq!(cache.get("/kate").unwrap().get("name"), Some(&json!("New")));
    }

    #[test]
    fn revision_change_during_pull_wipes_cache() {
        struct MovingStore(FakeStore);

        impl MirrorStore for MovingStore {
            fn ensure_cloned(&self) -> Result<(), MirrorError> {
                self.0.ensure_cloned()
            }
            fn pull(&self) -> Result<String, MirrorError> {
                self.0.set_revision("def");
                Ok("Fast-forward\n".to_string())
            }
            fn current_revision(&self) -> Result<String, MirrorError> {
                self.0.current_revision()
            }
        }

        let dir = tempdir().unwrap();
        let cache = Arc::new(PathCache::new(ProjectLoader::new(MirrorPaths::new(
            dir.path(),
        ))));
        let store = Arc::new(MovingStore(FakeStore::with_revision("abc")));
        let coordinator = RefreshCoordinator::new(store, Arc::clone(&cache));

        let report = coordinator.trigger_refresh().unwrap();
        assert!(report.cache_reset);
        assert_eq!(report.revision.as_deref(), Some("def"));
        assert_eq!(cache.stats().wipes, 1);
    }

    #[test]
    fn unknown_revision_wipes_cache() {
        let (_dir, _store, cache, coordinator) = setup(FakeStore::default());

        let report = coordinator.trigger_refresh().unwrap();
        assert!(report.cache_reset);
        assert_eq!(report.revision, None);
        assert_eq!(cache.stats().wipes, 1);
    }

    #[test]
    fn pull_failure_propagates_and_keeps_age() {
        let (_dir, store, _cache, coordinator) = setup(FakeStore::with_revision("abc"));
        *store.fail_pull.lock().unwrap() = Some("network down".to_string());

        assert_eq!(
            coordinator.trigger_refresh(),
            Err(MirrorError::Unavailable("network down".to_string()))
        );
        assert_eq!(coordinator.age(), Duration::MAX);
        assert!(coordinator.last_refresh_at().is_none());

        // No internal retry.
        assert_eq!(store.pulls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn age_starts_near_zero_and_grows() {
        let (_dir, _store, _cache, coordinator) = setup(FakeStore::with_revision("abc"));
        assert_eq!(coordinator.age(), Duration::MAX);

        coordinator.trigger_refresh().unwrap();
        let first = coordinator.age();
        assert!(first < Duration::from_secs(1));

        thread::sleep(Duration::from_millis(20));
        let second = coordinator.age();
        assert!(second > first);
        assert!(second >= Duration::from_millis(20));
    }

    #[test]
    fn concurrent_triggers_share_one_refresh() {
        let store = FakeStore {
            pull_delay: Duration::from_millis(300),
            ..FakeStore::with_revision("abc")
        };
        let (_dir, store, _cache, coordinator) = setup(store);
        let coordinator = Arc::new(coordinator);

        let callers = 8;
        let barrier = Arc::new(Barrier::new(callers));
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    coordinator.trigger_refresh()
                })
            })
            .collect();

        for handle in handles {
            let report = handle.join().unwrap().unwrap();
            assert_eq!(report.output, "Already up to date.\n");
        }

        assert_eq!(store.pulls.load(Ordering::SeqCst), 1);
        assert_eq!(store.clones.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn waiters_observe_leader_failure() {
        let store = FakeStore {
            pull_delay: Duration::from_millis(300),
            fail_pull: Mutex::new(Some("remote hung up".to_string())),
            ..FakeStore::with_revision("abc")
        };
        let (_dir, store, _cache, coordinator) = setup(store);
        let coordinator = Arc::new(coordinator);

        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    coordinator.trigger_refresh()
                })
            })
            .collect();

        for handle in handles {
            assert!(matches!(
                handle.join().unwrap(),
                Err(MirrorError::Unavailable(_))
            ));
        }
        assert_eq!(store.pulls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sequential_triggers_each_refresh() {
        let (_dir, store, _cache, coordinator) = setup(FakeStore::with_revision("abc"));

        coordinator.trigger_refresh().unwrap();
        coordinator.trigger_refresh().unwrap();

        assert_eq!(store.pulls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn startup_check_wipes_once() {
        let (_dir, _store, cache, coordinator) = setup(FakeStore::with_revision("abc"));

        assert!(coordinator.check_revision());
        assert!(!coordinator.check_revision());
        assert_eq!(cache.stats().wipes, 1);
    }
}
