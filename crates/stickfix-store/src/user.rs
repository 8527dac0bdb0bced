//! User records and the registry that owns them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::ResultCache;
use crate::tags::TagIndex;

/// Reserved id of the shared public collection.
pub const PUBLIC_USER_ID: &str = "SF-PUBLIC";

// ═══════════════════════════════════════════════════════════════════════
//  User record
// ═══════════════════════════════════════════════════════════════════════

/// A single user's settings and sticker index.
///
/// The result cache is transient: it is skipped when serializing and does
/// not take part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Caller-supplied identifier, or [`PUBLIC_USER_ID`].
    pub id: String,
    /// When set, reads and writes stay inside this record.
    #[serde(default)]
    pub private_mode: bool,
    /// When set, query results are returned in random order.
    #[serde(default)]
    pub shuffle: bool,
    /// Tag → stickers.
    #[serde(default)]
    pub tags: TagIndex,
    #[serde(skip)]
    pub result_cache: ResultCache,
}

impl UserRecord {
    /// Create a record with default flags and no stickers.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            private_mode: false,
            shuffle: false,
            tags: TagIndex::new(),
            result_cache: ResultCache::new(),
        }
    }

    /// Whether this is the shared public pseudo-user.
    pub fn is_public(&self) -> bool {
        self.id == PUBLIC_USER_ID
    }

    /// Link a sticker to `tags` in this record.
    pub fn add_sticker<S: AsRef<str>>(&mut self, sticker_id: &str, tags: &[S]) -> bool {
        let changed = self.tags.add(sticker_id, tags);
        debug!(user = %self.id, sticker = sticker_id, changed, "sticker linked");
        changed
    }

    /// Unlink a sticker from `tags` in this record.
    pub fn remove_sticker<S: AsRef<str>>(&mut self, sticker_id: &str, tags: &[S]) -> bool {
        let changed = self.tags.remove(sticker_id, tags);
        debug!(user = %self.id, sticker = sticker_id, changed, "sticker unlinked");
        changed
    }
}

impl PartialEq for UserRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.private_mode == other.private_mode
            && self.shuffle == other.shuffle
            && self.tags == other.tags
    }
}

impl Eq for UserRecord {}

// ═══════════════════════════════════════════════════════════════════════
//  Registry
// ═══════════════════════════════════════════════════════════════════════

/// Every user record, keyed by id. The unit of persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    users: BTreeMap<String, UserRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&UserRecord> {
        self.users.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut UserRecord> {
        self.users.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.users.contains_key(id)
    }

    /// Fetch `id`, creating a default record first if it is missing.
    pub fn get_or_create(&mut self, id: &str) -> &mut UserRecord {
        self.users.entry(id.to_string()).or_insert_with(|| {
            debug!(user = id, "created user record");
            UserRecord::new(id)
        })
    }

    /// The public pseudo-user, created on first use.
    pub fn public_mut(&mut self) -> &mut UserRecord {
        self.get_or_create(PUBLIC_USER_ID)
    }

    /// The public pseudo-user, if it exists yet.
    pub fn public(&self) -> Option<&UserRecord> {
        self.users.get(PUBLIC_USER_ID)
    }

    pub fn remove(&mut self, id: &str) -> Option<UserRecord> {
        self.users.remove(id)
    }

    pub fn users(&self) -> impl Iterator<Item = &UserRecord> {
        self.users.values()
    }

    pub fn users_mut(&mut self) -> impl Iterator<Item = &mut UserRecord> {
        self.users.values_mut()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Drop every cached result in every record. Returns entries removed.
    pub fn clear_caches(&mut self) -> usize {
        self.users_mut().map(|u| u.result_cache.clear()).sum()
    }

    /// Re-key entries whose stored `id` disagrees with their map key.
    ///
    /// Hand-edited documents can carry a mismatched `id` field; the map key
    /// is authoritative.
    pub(crate) fn normalize_ids(&mut self) {
        for (key, user) in self.users.iter_mut() {
            if user.id != *key {
                debug!(key = %key, id = %user.id, "record id differs from key, using key");
                user.id = key.clone();
            }
        }
    }
}
