//! Conjunctive tag queries over a resolved scope.
//!
//! A sticker matches when every requested tag carries it in at least one of
//! the scope's records. With shuffle off the result is in ascending
//! identifier order; with shuffle on it is a uniform random permutation.
//! An empty request is answered with one random tag from the scope's
//! default source so that callers always have something to show.

use std::collections::BTreeSet;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::scope::Scope;
use crate::user::Registry;

// ── pagination ───────────────────────────────────────────────────────

/// Half-open slice `[offset, offset + limit)` of a result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
}

impl Window {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// The whole list.
    pub fn all() -> Self {
        Self::new(0, usize::MAX)
    }

    /// Copy the part of `list` covered by this window, clipped to its length.
    pub fn apply(&self, list: &[String]) -> Vec<String> {
        list.iter()
            .skip(self.offset)
            .take(self.limit)
            .cloned()
            .collect()
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::all()
    }
}

// ── query steps ──────────────────────────────────────────────────────

/// Replace an empty tag request with one random tag from the default source.
///
/// Returns an empty list when the source has no tags (or does not exist).
pub fn effective_tags<R: Rng + ?Sized>(
    registry: &Registry,
    scope: &Scope,
    requested: &[String],
    rng: &mut R,
) -> Vec<String> {
    if !requested.is_empty() {
        return requested.to_vec();
    }
    registry
        .get(scope.default_tag_source())
        .map(|source| source.tags.random_tag_with(rng))
        .unwrap_or_default()
}

/// Stickers carrying `tag` in any record of the scope.
pub fn tag_union(registry: &Registry, scope: &Scope, tag: &str) -> BTreeSet<String> {
    scope
        .read_records(registry)
        .into_iter()
        .filter_map(|record| record.tags.lookup(tag))
        .flatten()
        .cloned()
        .collect()
}

/// Stickers matching every tag in `tags`. Empty `tags` match nothing.
pub fn matching_stickers(registry: &Registry, scope: &Scope, tags: &[String]) -> BTreeSet<String> {
    let mut tags = tags.iter();
    let Some(first) = tags.next() else {
        return BTreeSet::new();
    };

    let mut matches = tag_union(registry, scope, first);
    for tag in tags {
        if matches.is_empty() {
            break;
        }
        let union = tag_union(registry, scope, tag);
        matches.retain(|sticker| union.contains(sticker));
    }
    matches
}

/// Full query: default tag, union per tag, intersection, ordering.
///
/// Returns the tags that were actually used alongside the ordered list.
pub fn run<R: Rng + ?Sized>(
    registry: &Registry,
    scope: &Scope,
    requested: &[String],
    shuffle: bool,
    rng: &mut R,
) -> (Vec<String>, Vec<String>) {
    let tags = effective_tags(registry, scope, requested, rng);
    let mut stickers: Vec<String> = matching_stickers(registry, scope, &tags)
        .into_iter()
        .collect();
    if shuffle {
        stickers.shuffle(rng);
    }
    (tags, stickers)
}
