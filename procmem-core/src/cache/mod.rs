//! Content-addressed execution-result cache: LRU eviction plus TTL expiry,
//! keyed by a fingerprint of the code invoked, its context and the exact
//! tool-version set that produced it — not by query text, since a result
//! is only valid for the tool versions it was computed against.
//!
//! Same `lru` + `RwLock` shape and same hit/miss/eviction metrics as a
//! query-result cache, adapted to a content fingerprint instead of a
//! free-text query key.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::ToolVersions;

/// Default maximum cache entries.
pub const DEFAULT_MAX_ENTRIES: usize = crate::constants::DEFAULT_CACHE_MAX_ENTRIES;
/// Default entry TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Content fingerprint: a hash of the code/input and the tool-version set
/// it ran against. Two calls with identical code and context but different
/// tool versions must miss each other.
#[must_use]
pub fn fingerprint(code: &str, context: &serde_json::Value, tool_versions: &ToolVersions) -> String {
    let mut hasher = DefaultHasher::new();
    code.hash(&mut hasher);
    context.to_string().hash(&mut hasher);
    let mut versions: Vec<(&String, &String)> = tool_versions.iter().collect();
    versions.sort_by_key(|(k, _)| k.as_str());
    for (tool, version) in versions {
        tool.hash(&mut hasher);
        version.hash(&mut hasher);
    }
    format!("{:x}", hasher.finish())
}

struct Entry {
    result: serde_json::Value,
    tool_versions: ToolVersions,
    cached_at: Instant,
    ttl: Duration,
    original_latency_ms: u64,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

/// Cache performance counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub current_entries: usize,
    pub total_saved_ms: u64,
}

impl CacheStats {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    #[must_use]
    pub fn avg_latency_saved_ms(&self) -> f64 {
        if self.hits == 0 {
            0.0
        } else {
            self.total_saved_ms as f64 / self.hits as f64
        }
    }
}

/// LRU + TTL result cache, invalidated per-tool rather than wholesale (a
/// query cache that invalidates everything on every write would be
/// overkill here; a content-addressed cache doesn't need to, since entries
/// self-expire by tool version — but a tool's *own* entries still need
/// prompt invalidation the moment that tool's behavior is known to have
/// changed).
pub struct ResultCache {
    cache: RwLock<LruCache<String, Entry>>,
    stats: RwLock<CacheStats>,
    default_ttl: Duration,
    max_entries: usize,
}

impl ResultCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }

    #[must_use]
    pub fn with_capacity_and_ttl(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            cache: RwLock::new(LruCache::new(capacity)),
            stats: RwLock::new(CacheStats { current_entries: 0, ..Default::default() }),
            default_ttl: ttl,
            max_entries: capacity.get(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut cache = self.cache.write();
        let mut stats = self.stats.write();
        if let Some(entry) = cache.get(key) {
            if entry.is_expired() {
                cache.pop(key);
                stats.misses += 1;
                stats.evictions += 1;
                stats.current_entries = cache.len();
                return None;
            }
            stats.hits += 1;
            stats.total_saved_ms += entry.original_latency_ms;
            Some(entry.result.clone())
        } else {
            stats.misses += 1;
            None
        }
    }

    pub fn set(&self, key: String, result: serde_json::Value, tool_versions: ToolVersions, original_latency_ms: u64) {
        let mut cache = self.cache.write();
        let mut stats = self.stats.write();
        if cache.len() >= self.max_entries && !cache.contains(&key) {
            stats.evictions += 1;
        }
        cache.put(
            key,
            Entry { result, tool_versions, cached_at: Instant::now(), ttl: self.default_ttl, original_latency_ms },
        );
        stats.current_entries = cache.len();
    }

    /// Drop every entry whose tool-version set references `tool_name`
    /// (e.g. after a tool's schema or implementation changes).
    pub fn invalidate(&self, tool_name: &str) {
        let mut cache = self.cache.write();
        let stale: Vec<String> = cache
            .iter()
            .filter(|(_, entry)| entry.tool_versions.contains_key(tool_name))
            .map(|(key, _)| key.clone())
            .collect();
        let removed = stale.len();
        for key in stale {
            cache.pop(&key);
        }
        let mut stats = self.stats.write();
        stats.invalidations += removed as u64;
        stats.current_entries = cache.len();
    }

    pub fn clear(&self) {
        let mut cache = self.cache.write();
        let removed = cache.len();
        cache.clear();
        let mut stats = self.stats.write();
        stats.invalidations += removed as u64;
        stats.current_entries = 0;
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}
