use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Bounded TTL cache with per-entry cost.
///
/// Keys are opaque strings; values carry a cost (bytes for raw payloads, a
/// large constant for parsed structures) and an individual TTL. When the cost
/// budget is exceeded the oldest-inserted entries are evicted first. Expired
/// entries are dropped lazily on `get` and swept on `insert`.
pub struct TtlCache<V> {
    inner: Mutex<CacheInner<V>>,
    max_cost: u64,
}

struct CacheInner<V> {
    entries: HashMap<String, Entry<V>>,
    total_cost: u64,
}

struct Entry<V> {
    value: V,
    cost: u64,
    inserted_at: Instant,
    expires_at: Instant,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(max_cost: u64) -> Self {
        TtlCache {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                total_cost: 0,
            }),
            max_cost,
        }
    }

    /// Returns a clone of the cached value, dropping it if expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().unwrap();
        let expired = match inner.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            if let Some(entry) = inner.entries.remove(key) {
                inner.total_cost -= entry.cost;
            }
        }
        None
    }

    /// Insert a value. An entry whose cost alone exceeds the budget is not
    /// admitted.
    pub fn insert(&self, key: String, value: V, cost: u64, ttl: Duration) {
        if cost > self.max_cost {
            tracing::debug!(key = %key, cost, "cache entry larger than budget, not admitted");
            return;
        }
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();

        inner.sweep_expired(now);
        if let Some(old) = inner.entries.remove(&key) {
            inner.total_cost -= old.cost;
        }
        while inner.total_cost + cost > self.max_cost {
            if !inner.evict_oldest() {
                break;
            }
        }

        inner.total_cost += cost;
        inner.entries.insert(
            key,
            Entry {
                value,
                cost,
                inserted_at: now,
                expires_at: now + ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> CacheInner<V> {
    fn sweep_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            if let Some(entry) = self.entries.remove(&key) {
                self.total_cost -= entry.cost;
            }
        }
    }

    fn evict_oldest(&mut self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.inserted_at)
            .map(|(k, _)| k.clone());
        match oldest {
            Some(key) => {
                if let Some(entry) = self.entries.remove(&key) {
                    self.total_cost -= entry.cost;
                }
                true
            }
            None => false,
        }
    }
}
