//! Tag index: tag → sorted, deduplicated set of sticker identifiers.
//!
//! Tags are matched exactly (case-sensitive, emoji included). A tag is only
//! present while it has at least one sticker; removing the last sticker
//! removes the tag itself.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};

/// Per-user mapping from tag to the stickers carrying it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, BTreeSet<String>>",
    into = "BTreeMap<String, BTreeSet<String>>"
)]
pub struct TagIndex {
    tags: BTreeMap<String, BTreeSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link `sticker_id` to every tag in `tags`.
    ///
    /// Returns `true` if at least one tag gained the sticker.
    pub fn add<S: AsRef<str>>(&mut self, sticker_id: &str, tags: &[S]) -> bool {
        let mut changed = false;
        for tag in tags {
            changed |= self
                .tags
                .entry(tag.as_ref().to_string())
                .or_default()
                .insert(sticker_id.to_string());
        }
        changed
    }

    /// Unlink `sticker_id` from every tag in `tags`.
    ///
    /// Unknown tags and stickers are ignored. Returns `true` if anything was
    /// removed.
    pub fn remove<S: AsRef<str>>(&mut self, sticker_id: &str, tags: &[S]) -> bool {
        let mut changed = false;
        for tag in tags {
            let tag = tag.as_ref();
            let Some(stickers) = self.tags.get_mut(tag) else {
                continue;
            };
            changed |= stickers.remove(sticker_id);
            if stickers.is_empty() {
                self.tags.remove(tag);
            }
        }
        changed
    }

    /// Stickers carrying `tag`, or an empty set.
    pub fn get(&self, tag: &str) -> BTreeSet<String> {
        self.lookup(tag).cloned().unwrap_or_default()
    }

    /// Borrowing variant of [`get`](Self::get).
    pub fn lookup(&self, tag: &str) -> Option<&BTreeSet<String>> {
        self.tags.get(tag)
    }

    /// One tag chosen uniformly at random, or an empty list if there are none.
    pub fn random_tag(&self) -> Vec<String> {
        self.random_tag_with(&mut rand::thread_rng())
    }

    /// [`random_tag`](Self::random_tag) with a caller-supplied generator.
    pub fn random_tag_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<String> {
        self.tags.keys().choose(rng).cloned().into_iter().collect()
    }

    /// Iterate over all tags in ascending order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    /// All distinct sticker identifiers across every tag.
    pub fn stickers(&self) -> BTreeSet<&str> {
        self.tags
            .values()
            .flat_map(|set| set.iter().map(String::as_str))
            .collect()
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl From<BTreeMap<String, BTreeSet<String>>> for TagIndex {
    /// Drops empty tags so loaded documents honour the non-empty invariant.
    fn from(mut tags: BTreeMap<String, BTreeSet<String>>) -> Self {
        tags.retain(|_, stickers| !stickers.is_empty());
        Self { tags }
    }
}

impl From<TagIndex> for BTreeMap<String, BTreeSet<String>> {
    fn from(index: TagIndex) -> Self {
        index.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn add_links_every_tag() {
        let mut index = TagIndex::new();
        assert!(index.add("s1", &["cat", "😺"]));

        assert_eq!(index.get("cat"), set(&["s1"]));
        assert_eq!(index.get("😺"), set(&["s1"]));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn add_is_idempotent() {
        let mut once = TagIndex::new();
        once.add("s1", &["cat"]);

        let mut twice = TagIndex::new();
        twice.add("s1", &["cat"]);
        assert!(!twice.add("s1", &["cat"]));

        assert_eq!(once, twice);
    }

    #[test]
    fn stickers_stay_sorted() {
        let mut index = TagIndex::new();
        index.add("s3", &["cat"]);
        index.add("s1", &["cat"]);
        index.add("s2", &["cat"]);

        let ordered: Vec<_> = index.lookup("cat").unwrap().iter().cloned().collect();
        assert_eq!(ordered, vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn tags_are_case_sensitive() {
        let mut index = TagIndex::new();
        index.add("s1", &["Cat"]);
        assert!(index.get("cat").is_empty());
    }

    #[test]
    fn remove_reverses_add() {
        let mut index = TagIndex::new();
        index.add("s1", &["cat"]);
        let before = index.clone();

        index.add("s2", &["cat", "dog"]);
        assert!(index.remove("s2", &["cat", "dog"]));

        assert_eq!(index, before);
        assert!(index.lookup("dog").is_none());
    }

    #[test]
    fn remove_unknown_is_silent() {
        let mut index = TagIndex::new();
        index.add("s1", &["cat"]);

        assert!(!index.remove("s9", &["cat"]));
        assert!(!index.remove("s1", &["nope"]));
        assert_eq!(index.get("cat"), set(&["s1"]));
    }

    #[test]
    fn random_tag_on_empty_index() {
        assert!(TagIndex::new().random_tag().is_empty());
    }

    #[test]
    fn random_tag_picks_existing_key() {
        let mut index = TagIndex::new();
        index.add("s1", &["cat", "dog", "owl"]);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..20 {
            let picked = index.random_tag_with(&mut rng);
            assert_eq!(picked.len(), 1);
            assert!(index.lookup(&picked[0]).is_some());
        }
    }

    #[test]
    fn deserialize_drops_empty_tags() {
        let index: TagIndex =
            serde_json::from_str(r#"{"cat": ["s2", "s1", "s1"], "ghost": []}"#).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("cat"), set(&["s1", "s2"]));
    }

    #[test]
    fn distinct_stickers() {
        let mut index = TagIndex::new();
        index.add("s1", &["cat", "dog"]);
        index.add("s2", &["dog"]);
        assert_eq!(index.stickers().len(), 2);
    }
}
