//! Cache of composed modifier values.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use progression_core::ModifierStack;

/// Cached result for one feature key.
#[derive(Clone, Debug)]
pub struct CachedModifier {
    /// Value composed from `base_value`.
    pub value: f64,
    pub base_value: f64,
    /// Sum of current levels across every contributing modifier.
    pub total_level: u32,
    /// Resolved modifiers, used to recompose for a different base value.
    pub stack: ModifierStack,
    pub cached_at: DateTime<Utc>,
    expires_at: Instant,
}

impl CachedModifier {
    /// Value for `base`, recomposed from the cached stack when `base` differs
    /// from the one the entry was computed with.
    pub fn value_for(&self, base: f64) -> f64 {
        if base == self.base_value {
            self.value
        } else {
            self.stack.apply(base).value
        }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Time-bounded cache of modifier values keyed by feature key.
///
/// Guards read-through stores with a generation counter, like
/// [`UnlockCache`](super::UnlockCache).
#[derive(Debug)]
pub struct ModifierCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedModifier>>,
    generation: AtomicU64,
}

impl ModifierCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry for `feature_key`. Expired entries read as absent.
    pub fn get(&self, feature_key: &str) -> Option<CachedModifier> {
        let now = Instant::now();
        self.entries
            .read()
            .ok()?
            .get(feature_key)
            .filter(|entry| !entry.is_expired_at(now))
            .cloned()
    }

    pub fn set(&self, feature_key: &str, base_value: f64, value: f64, total_level: u32, stack: ModifierStack) {
        let entry = self.entry(base_value, value, total_level, stack);
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(feature_key.to_owned(), entry);
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Stores the entry only if no invalidation ran since `generation` was
    /// read. Returns whether it was stored.
    pub fn set_if_generation(
        &self,
        generation: u64,
        feature_key: &str,
        base_value: f64,
        value: f64,
        total_level: u32,
        stack: ModifierStack,
    ) -> bool {
        let entry = self.entry(base_value, value, total_level, stack);
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        entries.insert(feature_key.to_owned(), entry);
        true
    }

    pub fn invalidate_all(&self) {
        let entries = self.entries.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Ok(mut entries) = entries {
            entries.clear();
        }
    }

    fn entry(&self, base_value: f64, value: f64, total_level: u32, stack: ModifierStack) -> CachedModifier {
        CachedModifier {
            value,
            base_value,
            total_level,
            stack,
            cached_at: Utc::now(),
            expires_at: Instant::now() + self.ttl,
        }
    }

    /// Drops expired entries and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
