//! The sticker engine: one registry behind one lock.
//!
//! [`StickerStore`] is a cheap, cloneable handle. Every operation holds the
//! registry lock for its whole duration, so queries never observe a
//! half-applied mutation and saves never observe a registry mid-update.
//!
//! Mutations clear every result cache. A read that starts after a mutation
//! returns therefore always reflects it, whatever was cached before.

use std::sync::{Arc, Mutex, MutexGuard};

use rand::seq::IteratorRandom;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheStats, CachedList, ResultCache};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::persistence::{Generation, Persistence, SaveOutcome};
use crate::query::{self, Window};
use crate::scope::Scope;
use crate::user::{PUBLIC_USER_ID, Registry, UserRecord};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// One page of an inline query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePage {
    /// Tags the stickers were matched against.
    pub tags: Vec<String>,
    /// Stickers on this page.
    pub stickers: Vec<String>,
    /// Offset to request the next page with.
    pub next_offset: usize,
}

/// What an integrity check found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityStatus {
    /// The primary file parses.
    Healthy,
    /// The primary was corrupt or unexpectedly empty and has been restored
    /// from a backup.
    Restored(Generation),
}

/// Registry-wide counters.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub users: usize,
    pub tags: usize,
    pub stickers: usize,
    pub cached_results: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
}

struct Inner {
    registry: Registry,
    persistence: Persistence,
    /// Users in the document last loaded from or written to disk.
    persisted_users: usize,
}

impl Inner {
    fn replace_registry(&mut self, registry: Registry) {
        self.persisted_users = registry.len();
        self.registry = registry;
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Engine
// ═══════════════════════════════════════════════════════════════════════

/// Thread-safe handle to the sticker registry and its durable storage.
#[derive(Clone)]
pub struct StickerStore {
    inner: Arc<Mutex<Inner>>,
    stats: Arc<CacheStats>,
    page_size: usize,
}

impl StickerStore {
    /// Open the registry described by `config`, creating it on first start.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        Self::with_persistence(Persistence::new(config.registry_path()), config.page_size)
    }

    /// Open the registry managed by `persistence`.
    pub fn with_persistence(persistence: Persistence, page_size: usize) -> StoreResult<Self> {
        if page_size == 0 {
            return Err(StoreError::InvalidArgument("page size must be positive".into()));
        }
        let registry = persistence.load()?;
        info!(
            path = %persistence.path().display(),
            users = registry.len(),
            "sticker store opened"
        );
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                persisted_users: registry.len(),
                registry,
                persistence,
            })),
            stats: Arc::new(CacheStats::new()),
            page_size,
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    /// Inline page size.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Result cache hit/miss counters.
    pub fn cache_stats(&self) -> &CacheStats {
        &self.stats
    }

    // ── users ────────────────────────────────────────────────────────

    /// Return the record for `id`, creating it with defaults if missing.
    #[instrument(skip(self))]
    pub fn create_user(&self, id: &str) -> StoreResult<UserRecord> {
        validate_id(id)?;
        let mut inner = self.lock()?;
        let created = !inner.registry.contains(id);
        let record = inner.registry.get_or_create(id).clone();
        if created {
            info!(user = id, "user created");
        }
        Ok(record)
    }

    /// A copy of the record for `id`.
    pub fn user(&self, id: &str) -> StoreResult<UserRecord> {
        self.lock()?
            .registry
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "user",
                id: id.to_string(),
            })
    }

    /// Remove `id` and all of its tags. Returns `false` if it did not exist.
    ///
    /// The public pseudo-user cannot be deleted this way.
    #[instrument(skip(self))]
    pub fn delete_user(&self, id: &str) -> StoreResult<bool> {
        if id == PUBLIC_USER_ID {
            return Err(StoreError::InvalidArgument(
                "the public collection cannot be deleted".into(),
            ));
        }
        let mut inner = self.lock()?;
        let removed = inner.registry.remove(id).is_some();
        if removed {
            inner.registry.clear_caches();
            info!(user = id, "user deleted");
        }
        Ok(removed)
    }

    /// Switch `id` between private and public mode, creating it if needed.
    #[instrument(skip(self))]
    pub fn set_private_mode(&self, id: &str, private: bool) -> StoreResult<()> {
        self.update_user(id, |user| user.private_mode = private)
    }

    /// Turn result shuffling on or off for `id`, creating it if needed.
    #[instrument(skip(self))]
    pub fn set_shuffle(&self, id: &str, shuffle: bool) -> StoreResult<()> {
        self.update_user(id, |user| user.shuffle = shuffle)
    }

    fn update_user(&self, id: &str, f: impl FnOnce(&mut UserRecord)) -> StoreResult<()> {
        validate_id(id)?;
        let mut inner = self.lock()?;
        f(inner.registry.get_or_create(id));
        inner.registry.clear_caches();
        Ok(())
    }

    // ── stickers ─────────────────────────────────────────────────────

    /// Link `sticker_id` to `tags` in the caller's write target.
    ///
    /// Returns the id of the record that was modified.
    #[instrument(skip(self, tags), fields(tag_count = tags.len()))]
    pub fn add_sticker<S: AsRef<str>>(
        &self,
        caller_id: &str,
        sticker_id: &str,
        tags: &[S],
    ) -> StoreResult<String> {
        self.mutate_tags(caller_id, sticker_id, tags, |record| {
            record.add_sticker(sticker_id, tags)
        })
    }

    /// Unlink `sticker_id` from `tags` in the caller's write target.
    ///
    /// Returns the id of the record that was targeted.
    #[instrument(skip(self, tags), fields(tag_count = tags.len()))]
    pub fn remove_sticker<S: AsRef<str>>(
        &self,
        caller_id: &str,
        sticker_id: &str,
        tags: &[S],
    ) -> StoreResult<String> {
        self.mutate_tags(caller_id, sticker_id, tags, |record| {
            record.remove_sticker(sticker_id, tags)
        })
    }

    fn mutate_tags<S: AsRef<str>>(
        &self,
        caller_id: &str,
        sticker_id: &str,
        tags: &[S],
        apply: impl FnOnce(&mut UserRecord) -> bool,
    ) -> StoreResult<String> {
        validate_id(caller_id)?;
        validate_sticker(sticker_id)?;
        validate_tags(tags)?;

        let mut inner = self.lock()?;
        let target = Scope::resolve(&inner.registry, caller_id)
            .write_target()
            .to_string();
        let changed = apply(inner.registry.get_or_create(&target));
        if changed {
            inner.registry.clear_caches();
        }
        debug!(caller = caller_id, target = %target, changed, "tags updated");
        Ok(target)
    }

    // ── queries ──────────────────────────────────────────────────────

    /// Stickers matching every tag in `tags` within the caller's scope.
    ///
    /// Repeated identical queries from the same caller are answered from the
    /// result cache until it is invalidated.
    #[instrument(skip(self, tags), fields(tag_count = tags.len()))]
    pub fn get_sticker_list(
        &self,
        caller_id: &str,
        tags: &[String],
        shuffle: bool,
        window: Window,
    ) -> StoreResult<Vec<String>> {
        let mut inner = self.lock()?;
        let entry = self.cached_query(&mut inner.registry, caller_id, tags, shuffle);
        Ok(window.apply(&entry.stickers))
    }

    /// One inline page, using the caller's shuffle setting and the
    /// configured page size.
    pub fn inline_query(
        &self,
        caller_id: &str,
        tags: &[String],
        offset: usize,
    ) -> StoreResult<InlinePage> {
        let mut inner = self.lock()?;
        let scope = Scope::resolve(&inner.registry, caller_id);
        let shuffle = inner
            .registry
            .get(scope.home_id())
            .is_some_and(|home| home.shuffle);
        let entry = self.cached_query(&mut inner.registry, caller_id, tags, shuffle);
        Ok(InlinePage {
            stickers: Window::new(offset, self.page_size).apply(&entry.stickers),
            tags: entry.tags,
            next_offset: offset.saturating_add(self.page_size),
        })
    }

    /// One random sticker carrying `tag` within the caller's scope.
    pub fn random_sticker(&self, caller_id: &str, tag: &str) -> StoreResult<Option<String>> {
        let inner = self.lock()?;
        let scope = Scope::resolve(&inner.registry, caller_id);
        let union = query::tag_union(&inner.registry, &scope, tag);
        Ok(union.into_iter().choose(&mut rand::thread_rng()))
    }

    fn cached_query(
        &self,
        registry: &mut Registry,
        caller_id: &str,
        tags: &[String],
        shuffle: bool,
    ) -> CachedList {
        let scope = Scope::resolve(registry, caller_id);
        let key = ResultCache::tag_key(tags);

        let hit = registry
            .get(scope.home_id())
            .and_then(|home| home.result_cache.get(caller_id, &key))
            .filter(|entry| entry.answers(tags, shuffle))
            .cloned();
        if let Some(entry) = hit {
            self.stats.record_hit();
            return entry;
        }
        self.stats.record_miss();

        let (effective, stickers) =
            query::run(registry, &scope, tags, shuffle, &mut rand::thread_rng());
        let entry = CachedList {
            requested: tags.to_vec(),
            tags: effective,
            shuffled: shuffle,
            stickers,
        };
        if let Some(home) = registry.get_mut(scope.home_id()) {
            home.result_cache.store(caller_id, &key, entry.clone());
        }
        entry
    }

    // ── cache ────────────────────────────────────────────────────────

    /// Drop the entries `record_id` caches for `caller_id`. A missing record
    /// has nothing cached.
    pub fn invalidate_cache(&self, record_id: &str, caller_id: &str) -> StoreResult<usize> {
        Ok(self
            .lock()?
            .registry
            .get_mut(record_id)
            .map_or(0, |record| record.result_cache.invalidate(caller_id)))
    }

    /// Signal that `caller_id` picked one of the offered results.
    ///
    /// Drops the caller's cached answers from its home record, so the next
    /// query is computed fresh.
    pub fn consume(&self, caller_id: &str) -> StoreResult<usize> {
        let mut inner = self.lock()?;
        let home = Scope::resolve(&inner.registry, caller_id)
            .home_id()
            .to_string();
        Ok(inner
            .registry
            .get_mut(&home)
            .map_or(0, |record| record.result_cache.invalidate(caller_id)))
    }

    /// Clear every result cache in the registry.
    pub fn sweep_caches(&self) -> StoreResult<usize> {
        let removed = self.lock()?.registry.clear_caches();
        info!(removed, "result caches swept");
        Ok(removed)
    }

    // ── persistence ──────────────────────────────────────────────────

    /// Flush the registry to disk, rotating backups.
    ///
    /// If the written file fails verification the registry is replaced by
    /// the newest loadable backup.
    #[instrument(skip(self))]
    pub fn save(&self) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let outcome = inner.persistence.save(&inner.registry)?;
        match outcome {
            SaveOutcome::Written => inner.persisted_users = inner.registry.len(),
            SaveOutcome::Recovered {
                generation,
                registry,
            } => {
                warn!(%generation, "in-memory registry replaced by backup after failed save");
                inner.replace_registry(registry);
            }
        }
        Ok(())
    }

    /// Replace the in-memory registry with what is on disk.
    #[instrument(skip(self))]
    pub fn load(&self) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let registry = inner.persistence.load()?;
        inner.replace_registry(registry);
        Ok(())
    }

    /// Verify the primary file and restore from backups if it is corrupt,
    /// or if it is empty although the last document loaded or written had
    /// users in it.
    #[instrument(skip(self))]
    pub fn check_integrity(&self) -> StoreResult<IntegrityStatus> {
        let mut inner = self.lock()?;
        let (generation, registry) = match inner.persistence.verify() {
            Ok(on_disk) if on_disk.is_empty() && inner.persisted_users > 0 => {
                warn!(
                    expected_users = inner.persisted_users,
                    "registry file unexpectedly empty, restoring from backups"
                );
                inner.persistence.recover_nonempty()?
            }
            Ok(_) => return Ok(IntegrityStatus::Healthy),
            Err(e) if e.is_corrupt() => {
                warn!(error = %e, "registry file corrupt, restoring from backups");
                inner.persistence.recover()?
            }
            Err(e) => return Err(e),
        };
        inner.replace_registry(registry);
        Ok(IntegrityStatus::Restored(generation))
    }

    /// Roll the registry back to a backup generation.
    #[instrument(skip(self))]
    pub fn restore(&self, generation: Generation) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let registry = inner.persistence.restore(generation)?;
        inner.replace_registry(registry);
        Ok(())
    }

    // ── inspection ───────────────────────────────────────────────────

    /// A copy of the whole registry.
    pub fn snapshot(&self) -> StoreResult<Registry> {
        Ok(self.lock()?.registry.clone())
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let inner = self.lock()?;
        let registry = &inner.registry;
        let stickers = registry
            .users()
            .flat_map(|u| u.tags.stickers())
            .collect::<std::collections::BTreeSet<_>>()
            .len();
        Ok(StoreStats {
            users: registry.len(),
            tags: registry.users().map(|u| u.tags.len()).sum(),
            stickers,
            cached_results: registry.users().map(|u| u.result_cache.len()).sum(),
            cache_hits: self.stats.hits(),
            cache_misses: self.stats.misses(),
            cache_hit_rate: self.stats.hit_rate(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Validation
// ═══════════════════════════════════════════════════════════════════════

fn validate_id(id: &str) -> StoreResult<()> {
    if id.trim().is_empty() {
        return Err(StoreError::InvalidArgument("user id must not be empty".into()));
    }
    Ok(())
}

fn validate_sticker(sticker_id: &str) -> StoreResult<()> {
    if sticker_id.trim().is_empty() {
        return Err(StoreError::InvalidArgument("sticker id must not be empty".into()));
    }
    Ok(())
}

fn validate_tags<S: AsRef<str>>(tags: &[S]) -> StoreResult<()> {
    if tags.is_empty() {
        return Err(StoreError::InvalidArgument("at least one tag is required".into()));
    }
    if tags.iter().any(|t| t.as_ref().trim().is_empty()) {
        return Err(StoreError::InvalidArgument("tags must not be empty".into()));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
