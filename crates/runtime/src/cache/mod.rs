//! Read-through caches for the hot query paths.
//!
//! Both caches are safe for concurrent use and are emptied wholesale whenever
//! a node is unlocked or relocked, or the tree is reset (see
//! [`CacheInvalidationHandler`]).

mod modifier;
mod unlock;

pub use modifier::{CachedModifier, ModifierCache};
pub use unlock::UnlockCache;

use std::sync::Arc;

use tracing::debug;

use crate::events::{EventHandler, ProgressionEvent};

/// Empties both caches when unlock levels change.
pub struct CacheInvalidationHandler {
    unlocks: Arc<UnlockCache>,
    modifiers: Arc<ModifierCache>,
}

impl CacheInvalidationHandler {
    pub fn new(unlocks: Arc<UnlockCache>, modifiers: Arc<ModifierCache>) -> Self {
        Self { unlocks, modifiers }
    }
}

impl EventHandler for CacheInvalidationHandler {
    fn handle(&self, event: &ProgressionEvent) {
        self.modifiers.invalidate_all();
        self.unlocks.invalidate_all();

        if let ProgressionEvent::NodeUnlocked { node_key, level }
        | ProgressionEvent::NodeRelocked { node_key, level } = event
        {
            debug!(%node_key, level = *level, kind = %event.kind(), "invalidated progression caches");
        } else {
            debug!(kind = %event.kind(), "invalidated progression caches");
        }
    }
}
