//! Project record cache and its invalidation

mod gate;
mod store;

pub use gate::RevisionGate;
pub use store::{CacheStats, PathCache};
