//! Time-boxed response cache.
//!
//! Stores provider responses per (view, query) pair to avoid excessive API
//! calls. Entries expire after a fixed window; when capacity is exceeded the
//! single oldest-inserted entry is evicted. Eviction is deliberately FIFO by
//! insertion order, not LRU: a recent read does not protect an entry.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::CacheConfig;
use crate::models::{View, WeatherSnapshot};

pub const DEFAULT_MAX_ENTRIES: usize = 50;
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Compound cache key. Queries are trimmed and lowercased so that "London"
/// and " london " share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub view: View,
    pub query: String,
}

impl CacheKey {
    #[must_use]
    pub fn new(view: View, query: &str) -> Self {
        Self {
            view,
            query: query.trim().to_lowercase(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: WeatherSnapshot,
    inserted_at: Instant,
}

/// Cache size and configuration summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub len: usize,
    pub max_entries: usize,
    pub ttl: Duration,
}

/// In-memory key/value store with per-entry expiration and bounded capacity.
///
/// No operation blocks or fails; absence is a normal result. Capacity and
/// expiration window are fixed at construction.
#[derive(Debug)]
pub struct ResponseCache {
    entries: HashMap<CacheKey, CacheEntry>,
    order: VecDeque<CacheKey>,
    max_entries: usize,
    ttl: Duration,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

impl ResponseCache {
    #[must_use]
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::with_capacity(max_entries),
            order: VecDeque::with_capacity(max_entries),
            max_entries,
            ttl,
        }
    }

    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, Duration::from_secs(config.ttl_seconds))
    }

    /// Store a snapshot under `key`, stamped with the current time.
    ///
    /// Re-storing an existing key refreshes its value and timestamp in place,
    /// keeping its original insertion position. A genuinely new key evicts
    /// the oldest-inserted entry first when the store is at capacity.
    pub fn set(&mut self, key: CacheKey, snapshot: WeatherSnapshot) {
        let entry = CacheEntry {
            snapshot,
            inserted_at: Instant::now(),
        };

        if self.entries.contains_key(&key) {
            self.entries.insert(key, entry);
            return;
        }

        if self.entries.len() >= self.max_entries {
            if let Some(oldest) = self.order.pop_front() {
                debug!(view = %oldest.view, query = %oldest.query, "evicting oldest cache entry");
                self.entries.remove(&oldest);
            }
        }

        self.order.push_back(key.clone());
        self.entries.insert(key, entry);
    }

    /// Return the stored snapshot while it is still fresh. A stale entry is
    /// deleted as a side effect and reported as absent.
    pub fn get(&mut self, key: &CacheKey) -> Option<WeatherSnapshot> {
        let entry = self.entries.get(key)?;
        if entry.inserted_at.elapsed() < self.ttl {
            return Some(entry.snapshot.clone());
        }

        debug!(view = %key.view, query = %key.query, "cache entry expired");
        self.remove(key);
        None
    }

    /// Whether `key` is present and still fresh.
    pub fn has(&mut self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }

    /// Sweep out every entry whose age exceeds the expiration window.
    pub fn clear_expired(&mut self) {
        let stale: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for key in stale {
            self.remove(&key);
        }
    }

    /// Empty the store unconditionally.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            len: self.entries.len(),
            max_entries: self.max_entries,
            ttl: self.ttl,
        }
    }

    fn remove(&mut self, key: &CacheKey) {
        self.entries.remove(key);
        self.order.retain(|k| k != key);
    }
}
