//! Revision-gated cache invalidation.

use std::sync::Arc;

use super::PathCache;
use crate::mirror::MirrorStore;

/// Wipes the cache whenever the mirror's revision moves away from the one
/// the cache was built against.
///
/// If the revision cannot be determined the cache is wiped as well: serving
/// a possibly stale record is worse than rebuilding one. A mirror whose
/// revision query keeps failing therefore wipes on every check.
pub struct RevisionGate {
    cache: Arc<PathCache>,
}

impl RevisionGate {
    pub fn new(cache: Arc<PathCache>) -> Self {
        Self { cache }
    }

    /// Compare the mirror's revision with `remembered`, updating it and
    /// wiping the cache on change. Returns whether a wipe happened.
    pub fn check_and_maybe_reset(
        &self,
        store: &dyn MirrorStore,
        remembered: &mut Option<String>,
    ) -> bool {
        match store.current_revision() {
            Err(e) => {
                log::warn!("{}; resetting cache", e);
                self.cache.wipe();
                true
            }
            Ok(revision) if remembered.as_deref() != Some(revision.as_str()) => {
                log::info!(
                    "Mirror moved from {} to {}",
                    remembered.as_deref().unwrap_or("<none>"),
                    revision
                );
                *remembered = Some(revision);
                self.cache.wipe();
                true
            }
            Ok(_) => false,
        }
    }
}
