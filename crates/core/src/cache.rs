//! Read-through cache for JSON records
//!
//! Entries are bounded by count and by age. Capacity eviction is FIFO: the
//! entry inserted first goes first, reads do not reorder, and setting an
//! existing key counts as a new insertion. Whether a key is cacheable at
//! all is decided by the caller through [`ReadCache::matches`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::Value;

use crate::config::CacheConfig;
use crate::error::{Error, Result};

/// Source of time for entry ages
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner()) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A cached record
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Arc<Value>,
    pub inserted_at: Instant,
    pub last_access_at: Instant,
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    // insertion sequence -> key, oldest first
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn pop_oldest(&mut self) -> Option<(String, CacheEntry)> {
        let (_, key) = self.order.pop_first()?;
        let entry = self.entries.remove(&key)?;
        Some((key, entry))
    }
}

/// In-memory record cache
pub struct ReadCache {
    pattern: Regex,
    max_items: usize,
    max_age: Option<Duration>,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl ReadCache {
    /// Cache keys matching `pattern`, holding at most `max_items` entries
    /// each for less than `max_age`
    pub fn new(pattern: &str, max_items: usize, max_age: Option<Duration>) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::InvalidArgument(format!("invalid cache key pattern: {e}")))?;
        Ok(Self {
            pattern,
            max_items,
            max_age,
            clock: Arc::new(SystemClock),
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Cache from configuration, `None` when disabled
    pub fn from_config(config: &CacheConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let max_age = (config.max_age_secs > 0).then(|| Duration::from_secs(config.max_age_secs));
        Self::new(&config.key_pattern, config.max_items, max_age).map(Some)
    }

    /// Use another time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Whether `key` is eligible for caching
    pub fn matches(&self, key: &str) -> bool {
        self.pattern.is_match(key)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        self.max_age
            .is_some_and(|max_age| now.saturating_duration_since(entry.inserted_at) >= max_age)
    }

    /// Cached value, or `None` when absent or expired
    pub fn get(&self, key: &str) -> Option<Arc<Value>> {
        let now = self.clock.now();
        let mut inner = self.lock();

        let expired = self.expired(inner.entries.get(key)?, now);
        if expired {
            inner.remove(key);
            tracing::debug!(key, "cache entry expired");
            return None;
        }

        let entry = inner.entries.get_mut(key)?;
        entry.last_access_at = now;
        Some(entry.value.clone())
    }

    /// Whether a live entry exists
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace an entry, evicting the oldest beyond capacity
    pub fn set(&self, key: &str, value: Arc<Value>) {
        let now = self.clock.now();
        let mut inner = self.lock();

        inner.remove(key);
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.to_string());
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: now,
                last_access_at: now,
                seq,
            },
        );

        // oldest entries sit at the front, so expired ones do too
        while let Some((_, front)) = inner.order.first_key_value() {
            let expired = inner
                .entries
                .get(front)
                .is_none_or(|entry| self.expired(entry, now));
            if !expired {
                break;
            }
            inner.pop_oldest();
        }

        while inner.entries.len() > self.max_items {
            if let Some((evicted, _)) = inner.pop_oldest() {
                tracing::debug!(key = %evicted, "cache eviction");
            } else {
                break;
            }
        }
    }

    /// Drop an entry
    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Number of stored entries, expired ones included until touched
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}

impl fmt::Debug for ReadCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadCache")
            .field("pattern", &self.pattern.as_str())
            .field("max_items", &self.max_items)
            .field("max_age", &self.max_age)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn value(v: Value) -> Arc<Value> {
        Arc::new(v)
    }

    #[test]
    fn test_fifo_eviction_ignores_reads() {
        let cache = ReadCache::new(".*", 2, None).unwrap();
        cache.set("a", value(json!(1)));
        cache.set("b", value(json!(2)));

        // reading "a" must not save it
        assert!(cache.get("a").is_some());
        cache.set("c", value(json!(3)));

        assert!(!cache.has("a"));
        assert!(cache.has("b"));
        assert!(cache.has("c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_reset_counts_as_fresh_insertion() {
        let cache = ReadCache::new(".*", 2, None).unwrap();
        cache.set("a", value(json!(1)));
        cache.set("b", value(json!(2)));
        cache.set("a", value(json!(10)));
        cache.set("c", value(json!(3)));

        assert!(!cache.has("b"));
        assert_eq!(*cache.get("a").unwrap(), json!(10));
    }

    #[test]
    fn test_ttl_expiry() {
        let clock = Arc::new(ManualClock::new());
        let cache = ReadCache::new(".*", 10, Some(Duration::from_secs(60)))
            .unwrap()
            .with_clock(clock.clone());
        cache.set("k", value(json!({"x": 1})));

        clock.advance(Duration::from_secs(59));
        assert!(cache.has("k"));

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_purges_expired_front() {
        let clock = Arc::new(ManualClock::new());
        let cache = ReadCache::new(".*", 10, Some(Duration::from_secs(5)))
            .unwrap()
            .with_clock(clock.clone());
        cache.set("old", value(json!(1)));
        clock.advance(Duration::from_secs(10));
        cache.set("new", value(json!(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_pattern_and_delete() {
        let cache = ReadCache::new(r"^users/", 10, None).unwrap();
        assert!(cache.matches("users/1"));
        assert!(!cache.matches("logs/1"));

        cache.set("users/1", value(json!(null)));
        assert!(cache.delete("users/1"));
        assert!(!cache.delete("users/1"));

        cache.set("users/2", value(json!(2)));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_from_config() {
        let disabled = CacheConfig::default();
        assert!(ReadCache::from_config(&disabled).unwrap().is_none());

        let config = CacheConfig {
            enabled: true,
            key_pattern: "(".into(),
            ..Default::default()
        };
        assert!(ReadCache::from_config(&config).is_err());
    }
}
