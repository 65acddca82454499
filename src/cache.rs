//! Short-lived memo of popularity scores.
//!
//! Disabled by default, in which case every lookup recomputes. When a TTL is
//! configured, a score is reused until it expires or its product is
//! invalidated by a write.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

struct Entry {
    score: f64,
    stored_at: Instant,
}

#[derive(Default)]
struct Slots {
    entries: HashMap<String, Entry>,
    // Bumped on every invalidation; a score computed under an older
    // generation is returned to its caller but never stored.
    generations: HashMap<String, u64>,
}

pub struct ScoreCache {
    ttl: Option<Duration>,
    slots: RwLock<Slots>,
}

impl ScoreCache {
    /// A zero TTL disables caching.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: (!ttl.is_zero()).then_some(ttl),
            slots: RwLock::new(Slots::default()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        self.ttl.is_some()
    }

    /// Cached score for `product_id`, or the result of `compute` (stored for
    /// next time when caching is on and no write invalidated the product
    /// while it was being computed).
    pub fn get_or_compute<F>(&self, product_id: &str, compute: F) -> f64
    where
        F: FnOnce() -> f64,
    {
        let Some(ttl) = self.ttl else {
            return compute();
        };

        let lookup = self.slots.read().ok().map(|slots| {
            let fresh = slots
                .entries
                .get(product_id)
                .filter(|e| e.stored_at.elapsed() < ttl)
                .map(|e| e.score);
            (fresh, slots.generations.get(product_id).copied().unwrap_or(0))
        });
        let generation = match lookup {
            Some((Some(score), _)) => return score,
            Some((None, generation)) => generation,
            None => return compute(),
        };

        let score = compute();
        if let Ok(mut slots) = self.slots.write() {
            let current = slots.generations.get(product_id).copied().unwrap_or(0);
            if current == generation {
                slots.entries.insert(
                    product_id.to_string(),
                    Entry {
                        score,
                        stored_at: Instant::now(),
                    },
                );
            } else {
                tracing::debug!(product_id = %product_id, "Discarding score computed before invalidation");
            }
        }
        score
    }

    pub fn invalidate(&self, product_id: &str) {
        if let Ok(mut slots) = self.slots.write() {
            slots.entries.remove(product_id);
            *slots.generations.entry(product_id.to_string()).or_insert(0) += 1;
        }
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) {
        let Some(ttl) = self.ttl else {
            return;
        };
        if let Ok(mut slots) = self.slots.write() {
            slots.entries.retain(|_, e| e.stored_at.elapsed() < ttl);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_disabled_cache_always_recomputes() {
        let cache = ScoreCache::disabled();
        let calls = Cell::new(0);
        for _ in 0..3 {
            cache.get_or_compute("p1", || {
                calls.set(calls.get() + 1);
                1.5
            });
        }
        assert_eq!(calls.get(), 3);
        assert!(cache.is_empty());
        assert!(!cache.is_enabled());
    }

    #[test]
    fn test_enabled_cache_reuses_score() {
        let cache = ScoreCache::new(Duration::from_secs(60));
        assert_eq!(cache.get_or_compute("p1", || 2.0), 2.0);
        assert_eq!(cache.get_or_compute("p1", || 99.0), 2.0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_forces_recompute() {
        let cache = ScoreCache::new(Duration::from_secs(60));
        cache.get_or_compute("p1", || 2.0);
        cache.invalidate("p1");
        assert_eq!(cache.get_or_compute("p1", || 3.0), 3.0);
    }

    #[test]
    fn test_invalidation_during_compute_is_not_overwritten() {
        let cache = ScoreCache::new(Duration::from_secs(60));
        // A review write lands while the listing is still scoring old stats.
        let stale = cache.get_or_compute("p1", || {
            cache.invalidate("p1");
            1.0
        });
        assert_eq!(stale, 1.0);
        assert!(cache.is_empty());
        assert_eq!(cache.get_or_compute("p1", || 2.0), 2.0);
        assert_eq!(cache.get_or_compute("p1", || 3.0), 2.0);
    }

    #[test]
    fn test_invalidating_other_product_keeps_store() {
        let cache = ScoreCache::new(Duration::from_secs(60));
        cache.get_or_compute("p1", || {
            cache.invalidate("p2");
            1.0
        });
        assert_eq!(cache.get_or_compute("p1", || 5.0), 1.0);
    }

    #[test]
    fn test_expired_entries_are_recomputed_and_purged() {
        let cache = ScoreCache::new(Duration::from_millis(10));
        cache.get_or_compute("p1", || 2.0);
        std::thread::sleep(Duration::from_millis(25));
        cache.purge_expired();
        assert!(cache.is_empty());
        assert_eq!(cache.get_or_compute("p1", || 4.0), 4.0);
    }
}
