use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use url::Url;

use crate::types::FetchResult;

/// Hash of the normalized request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a request whose values were already clamped. The URL is taken
    /// in its parsed form (lowercase host, default port dropped) without the
    /// fragment.
    pub fn for_request(
        url: &Url,
        wait: Duration,
        scroll: bool,
        max_chars: usize,
        readability: bool,
    ) -> Self {
        let mut normalized = url.clone();
        normalized.set_fragment(None);

        let mut hasher = blake3::Hasher::new();
        hasher.update(normalized.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(&(wait.as_millis() as u64).to_le_bytes());
        hasher.update(&[scroll as u8, readability as u8]);
        hasher.update(&(max_chars as u64).to_le_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: FetchResult,
    size_bytes: usize,
    inserted_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct CacheState {
    entries: LruCache<CacheKey, CacheEntry>,
    total_bytes: usize,
    stats: CacheStats,
}

/// Process-wide store of prior fetch results with a byte cap and an entry
/// cap. Eviction happens only on insertion, least recently used first.
pub struct FetchCache {
    max_bytes: usize,
    max_entries: usize,
    state: Mutex<CacheState>,
}

impl FetchCache {
    pub fn new(max_bytes: usize, max_entries: usize) -> Self {
        Self {
            max_bytes,
            max_entries: max_entries.max(1),
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                total_bytes: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stored size of a result: its JSON encoding.
    pub fn size_of(value: &FetchResult) -> usize {
        serde_json::to_vec(value).map(|v| v.len()).unwrap_or(usize::MAX)
    }

    pub fn get(&self, key: &CacheKey) -> Option<FetchResult> {
        let mut state = self.lock();
        match state.entries.get(key) {
            Some(entry) => {
                let value = entry.value.clone();
                let age_ms = entry.inserted_at.elapsed().as_millis() as u64;
                state.stats.hits += 1;
                tracing::debug!(key = %key, age_ms, "cache.hit");
                Some(value)
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    /// Store `value`, evicting least recently used entries until it fits.
    /// Returns `false` when the value alone is larger than the byte cap.
    pub fn put(&self, key: CacheKey, value: FetchResult) -> bool {
        let size_bytes = Self::size_of(&value);
        if size_bytes > self.max_bytes {
            tracing::debug!(key = %key, size_bytes, cap = self.max_bytes, "cache.rejected_oversized");
            return false;
        }

        let mut state = self.lock();
        if let Some(old) = state.entries.pop(&key) {
            state.total_bytes -= old.size_bytes;
        }
        while state.total_bytes + size_bytes > self.max_bytes
            || state.entries.len() >= self.max_entries
        {
            let Some((evicted, entry)) = state.entries.pop_lru() else {
                break;
            };
            state.total_bytes -= entry.size_bytes;
            state.stats.evictions += 1;
            tracing::debug!(key = %evicted, size_bytes = entry.size_bytes, "cache.evict");
        }

        state.total_bytes += size_bytes;
        state.entries.push(
            key,
            CacheEntry {
                value,
                size_bytes,
                inserted_at: Instant::now(),
            },
        );
        true
    }

    pub fn total_bytes(&self) -> usize {
        self.lock().total_bytes
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            total_bytes: state.total_bytes,
            ..state.stats
        }
    }
}

impl fmt::Debug for FetchCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchCache")
            .field("max_bytes", &self.max_bytes)
            .field("max_entries", &self.max_entries)
            .field("stats", &self.stats())
            .finish()
    }
}
