//! Cache of node unlock status.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Caches `(node key, level) -> unlocked` lookups.
///
/// A missing entry is a real miss; callers fall back to the repository and
/// store the answer. Entries never expire on their own.
///
/// Every [`invalidate_all`](Self::invalidate_all) bumps a generation counter.
/// Read-through callers snapshot [`generation`](Self::generation) before
/// reading the repository and store with
/// [`set_if_generation`](Self::set_if_generation), so an answer read before an
/// invalidation is never cached after it.
#[derive(Debug, Default)]
pub struct UnlockCache {
    entries: RwLock<HashMap<(String, u32), bool>>,
    generation: AtomicU64,
}

impl UnlockCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_key: &str, level: u32) -> Option<bool> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(&(node_key.to_owned(), level)).copied())
    }

    pub fn set(&self, node_key: &str, level: u32, unlocked: bool) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert((node_key.to_owned(), level), unlocked);
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Stores the entry only if no invalidation ran since `generation` was
    /// read. Returns whether it was stored.
    pub fn set_if_generation(&self, generation: u64, node_key: &str, level: u32, unlocked: bool) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        entries.insert((node_key.to_owned(), level), unlocked);
        true
    }

    pub fn invalidate_all(&self) {
        let entries = self.entries.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Ok(mut entries) = entries {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn miss_then_hit() {
        let cache = UnlockCache::new();
        assert_eq!(cache.get("feature_buy", 1), None);

        cache.set("feature_buy", 1, false);
        assert_eq!(cache.get("feature_buy", 1), Some(false));
        assert_eq!(cache.get("feature_buy", 2), None);
    }

    #[test]
    fn invalidate_clears_everything() {
        let cache = UnlockCache::new();
        cache.set("a", 1, true);
        cache.set("b", 1, false);
        assert_eq!(cache.len(), 2);

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn answer_read_before_invalidation_is_dropped() {
        let cache = UnlockCache::new();
        let before = cache.generation();

        // Unlock lands and invalidates while the stale answer is in flight.
        cache.invalidate_all();

        assert!(!cache.set_if_generation(before, "feature_buy", 1, false));
        assert_eq!(cache.get("feature_buy", 1), None);

        let current = cache.generation();
        assert!(cache.set_if_generation(current, "feature_buy", 1, true));
        assert_eq!(cache.get("feature_buy", 1), Some(true));
    }

    #[test]
    fn concurrent_access() {
        let cache = Arc::new(UnlockCache::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100u32 {
                        let key = format!("node_{}", i % 10);
                        cache.set(&key, worker, i % 2 == 0);
                        cache.get(&key, worker);
                        if i % 25 == 0 {
                            cache.invalidate_all();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 80);
    }
}
