//! Per-record result cache.
//!
//! Memoizes the last sticker list computed for a `(caller, tags)` pair so
//! that successive inline pages of one query walk the same list, even when
//! the caller has shuffle enabled. Entries are dropped when the caller
//! consumes a result, on any registry mutation, and by the periodic sweep.
//!
//! The cache is never persisted and never affects what a query returns,
//! only how much work it costs.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

/// Separator used to join requested tags into a cache key.
pub const TAG_KEY_SEPARATOR: &str = "-";

// ── cache stats ──────────────────────────────────────────────────────

/// Hit and miss counts for the result caches of one store.
///
/// Shared by every clone of the store handle; counts since open.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn lookups(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Fraction of lookups answered from cache, `0.0` before the first one.
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            n => self.hits() as f64 / n as f64,
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} lookups cached ({:.1}%)",
            self.hits(),
            self.lookups(),
            self.hit_rate() * 100.0
        )
    }
}

// ── result cache ─────────────────────────────────────────────────────

/// A memoized query answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedList {
    /// Tags exactly as requested.
    pub requested: Vec<String>,
    /// Tags the answer was computed for (the random default for an empty
    /// request).
    pub tags: Vec<String>,
    /// Whether `stickers` is in random order rather than ascending.
    pub shuffled: bool,
    pub stickers: Vec<String>,
}

impl CachedList {
    /// An unshuffled answer, mostly useful in tests.
    pub fn ordered(stickers: Vec<String>) -> Self {
        Self {
            requested: Vec::new(),
            tags: Vec::new(),
            shuffled: false,
            stickers,
        }
    }

    /// Whether this entry is the answer to `requested` in the given order
    /// mode. Distinct tag lists can join to the same key (`["a-b"]` and
    /// `["a", "b"]`), so a key match alone is not enough.
    pub fn answers<S: AsRef<str>>(&self, requested: &[S], shuffled: bool) -> bool {
        self.shuffled == shuffled
            && self.requested.len() == requested.len()
            && self
                .requested
                .iter()
                .zip(requested)
                .all(|(a, b)| a == b.as_ref())
    }
}

/// Cached sticker lists, grouped by the caller that requested them.
///
/// The public pseudo-user serves every caller without a record of their
/// own, so one record may hold entries for many callers.
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    entries: HashMap<String, HashMap<String, CachedList>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the cache key for a tag list, preserving the order given.
    pub fn tag_key<S: AsRef<str>>(tags: &[S]) -> String {
        tags.iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(TAG_KEY_SEPARATOR)
    }

    /// Look up the list cached for `caller_id` under `tag_key`.
    pub fn get(&self, caller_id: &str, tag_key: &str) -> Option<&CachedList> {
        self.entries
            .get(caller_id)
            .and_then(|by_tags| by_tags.get(tag_key))
    }

    /// Store a list, overwriting any previous entry for the same key.
    pub fn store(&mut self, caller_id: &str, tag_key: &str, entry: CachedList) {
        debug!(
            caller = caller_id,
            key = tag_key,
            len = entry.stickers.len(),
            "result_cache.store"
        );
        self.entries
            .entry(caller_id.to_string())
            .or_default()
            .insert(tag_key.to_string(), entry);
    }

    /// Drop every entry cached for `caller_id`. Returns how many were removed.
    pub fn invalidate(&mut self, caller_id: &str) -> usize {
        let removed = self.entries.remove(caller_id).map_or(0, |m| m.len());
        if removed > 0 {
            debug!(caller = caller_id, removed, "result_cache.invalidate");
        }
        removed
    }

    /// Drop everything. Returns how many entries were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.len();
        self.entries.clear();
        removed
    }

    /// Number of cached lists across all callers.
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(HashMap::is_empty)
    }
}

// ── tests ────────────────────────────────────────────────────────────
