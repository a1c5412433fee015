//! A single named source list and its expiry schedule.

use rpz_core::{ListType, SourceFormat, TaggedName};
use std::collections::{BTreeMap, BTreeSet};

use super::membership::{MapNames, NameMembership, NameStore, TrieNames};
use crate::config::DataSource;
use crate::SrvError;

/// One named source within a category.
#[derive(Debug, Clone)]
pub struct NameList {
    name: String,
    list_type: ListType,
    datasource: DataSource,
    description: String,
    store: NameStore,
    /// Reaper bucket -> names to evict when that bucket is swept.
    buckets: BTreeMap<i64, BTreeSet<String>>,
}

impl NameList {
    /// An empty mutable list.
    pub fn new_map(name: impl Into<String>, list_type: ListType, datasource: DataSource) -> Self {
        Self {
            name: name.into(),
            list_type,
            datasource,
            description: String::new(),
            store: NameStore::Map(MapNames::new()),
            buckets: BTreeMap::new(),
        }
    }

    /// A mutable list pre-filled with `entries`.
    pub fn with_entries(
        name: impl Into<String>,
        list_type: ListType,
        datasource: DataSource,
        entries: impl IntoIterator<Item = TaggedName>,
    ) -> Self {
        let mut list = Self::new_map(name, list_type, datasource);
        let mut map = MapNames::new();
        for entry in entries {
            if let Some(bucket) = entry.expires {
                list.buckets.entry(bucket).or_default().insert(entry.name.clone());
            }
            map.insert(entry);
        }
        list.store = NameStore::Map(map);
        list
    }

    /// An immutable trie-backed list.
    pub fn new_trie(name: impl Into<String>, list_type: ListType, names: TrieNames) -> Self {
        Self {
            name: name.into(),
            list_type,
            datasource: DataSource::File,
            description: String::new(),
            store: NameStore::Trie(names),
            buckets: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn list_type(&self) -> ListType {
        self.list_type
    }

    pub const fn datasource(&self) -> DataSource {
        self.datasource
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub const fn format(&self) -> SourceFormat {
        match self.store {
            NameStore::Map(_) => SourceFormat::Map,
            NameStore::Trie(_) => SourceFormat::Dawg,
        }
    }

    /// Only map-backed lists accept additions and removals.
    pub const fn is_mutable(&self) -> bool {
        matches!(self.store, NameStore::Map(_))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.store.contains(name)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Stored entry for `name`. Trie lists carry no metadata.
    pub fn get(&self, name: &str) -> Option<&TaggedName> {
        match &self.store {
            NameStore::Map(m) => m.get(name),
            NameStore::Trie(_) => None,
        }
    }

    /// Every entry, or `None` if the list cannot be enumerated.
    pub fn entries(&self) -> Option<impl Iterator<Item = &TaggedName>> {
        match &self.store {
            NameStore::Map(m) => Some(m.iter()),
            NameStore::Trie(_) => None,
        }
    }

    fn map_mut(&mut self) -> crate::Result<&mut MapNames> {
        match &mut self.store {
            NameStore::Map(m) => Ok(m),
            NameStore::Trie(_) => Err(SrvError::Source(format!(
                "{}/{} is trie-backed and cannot be changed",
                self.list_type, self.name
            ))),
        }
    }

    /// Insert or replace an entry. A replaced entry loses its old reaper slot.
    pub fn insert(&mut self, entry: TaggedName) -> crate::Result<()> {
        let expires = entry.expires;
        let name = entry.name.clone();
        let previous = self.map_mut()?.insert(entry);
        if let Some(old) = previous {
            self.unschedule(&old);
        }
        if let Some(bucket) = expires {
            self.buckets.entry(bucket).or_default().insert(name);
        }
        Ok(())
    }

    /// Remove an entry and its reaper slot.
    pub fn remove(&mut self, name: &str) -> crate::Result<Option<TaggedName>> {
        let removed = self.map_mut()?.remove(name);
        if let Some(old) = &removed {
            self.unschedule(old);
        }
        Ok(removed)
    }

    /// Swap in a whole new set of entries (upstream refresh).
    pub fn replace_entries(&mut self, entries: Vec<TaggedName>) -> crate::Result<()> {
        self.map_mut()?;
        self.buckets.clear();
        self.store = NameStore::Map(MapNames::new());
        for entry in entries {
            self.insert(entry)?;
        }
        Ok(())
    }

    fn unschedule(&mut self, entry: &TaggedName) {
        let Some(bucket) = entry.expires else {
            return;
        };
        if let Some(names) = self.buckets.get_mut(&bucket) {
            names.remove(&entry.name);
            if names.is_empty() {
                self.buckets.remove(&bucket);
            }
        }
    }

    /// Names waiting in `bucket`.
    pub fn scheduled(&self, bucket: i64) -> impl Iterator<Item = &str> {
        self.buckets
            .get(&bucket)
            .into_iter()
            .flat_map(|names| names.iter().map(String::as_str))
    }

    /// Number of names waiting in any bucket.
    pub fn pending_evictions(&self) -> usize {
        self.buckets.values().map(BTreeSet::len).sum()
    }

    /// Evict everything due at `bucket`.
    ///
    /// Buckets older than `bucket` were missed by an earlier sweep; their
    /// names are carried into `bucket` and evicted with it.
    pub fn sweep(&mut self, bucket: i64) -> Vec<TaggedName> {
        let missed: Vec<i64> = self.buckets.range(..bucket).map(|(b, _)| *b).collect();
        for old in missed {
            if let Some(names) = self.buckets.remove(&old) {
                self.buckets.entry(bucket).or_default().extend(names);
            }
        }

        let Some(due) = self.buckets.remove(&bucket) else {
            return Vec::new();
        };
        let NameStore::Map(map) = &mut self.store else {
            return Vec::new();
        };
        due.iter().filter_map(|name| map.remove(name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expiring(name: &str, bucket: i64) -> TaggedName {
        TaggedName {
            expires: Some(bucket),
            ..TaggedName::bare(name, "grey")
        }
    }

    #[test]
    fn test_trie_list_is_immutable() {
        let trie = TrieNames::from_names(["a.example."]).unwrap();
        let mut list = NameList::new_trie("t", ListType::Blacklist, trie);
        assert!(list.contains("a.example."));
        assert!(list.entries().is_none());
        assert!(list.insert(TaggedName::bare("b.example.", "t")).is_err());
        assert!(list.remove("a.example.").is_err());
    }

    #[test]
    fn test_readd_moves_bucket() {
        let mut list = NameList::new_map("grey", ListType::Greylist, DataSource::Feed);
        list.insert(expiring("x.example.", 120)).unwrap();
        list.insert(expiring("x.example.", 300)).unwrap();
        assert_eq!(list.scheduled(120).count(), 0);
        assert_eq!(list.scheduled(300).collect::<Vec<_>>(), vec!["x.example."]);
        assert_eq!(list.pending_evictions(), 1);
    }

    #[test]
    fn test_remove_unschedules() {
        let mut list = NameList::new_map("grey", ListType::Greylist, DataSource::Feed);
        list.insert(expiring("x.example.", 120)).unwrap();
        list.remove("x.example.").unwrap();
        assert_eq!(list.pending_evictions(), 0);
        assert!(list.sweep(120).is_empty());
    }

    #[test]
    fn test_sweep_carries_missed_buckets() {
        let mut list = NameList::new_map("grey", ListType::Greylist, DataSource::Feed);
        list.insert(expiring("old.example.", 60)).unwrap();
        list.insert(expiring("due.example.", 180)).unwrap();
        list.insert(expiring("later.example.", 240)).unwrap();

        let mut reaped: Vec<String> = list.sweep(180).into_iter().map(|e| e.name).collect();
        reaped.sort();
        assert_eq!(reaped, vec!["due.example.", "old.example."]);
        assert!(list.contains("later.example."));
        assert!(!list.contains("old.example."));
        assert_eq!(list.pending_evictions(), 1);
    }

    #[test]
    fn test_replace_entries_clears_schedule() {
        let mut list = NameList::new_map("up", ListType::Blacklist, DataSource::Xfr);
        list.insert(expiring("gone.example.", 60)).unwrap();
        list.replace_entries(vec![TaggedName::bare("new.example.", "up")])
            .unwrap();
        assert!(!list.contains("gone.example."));
        assert!(list.contains("new.example."));
        assert_eq!(list.pending_evictions(), 0);
    }
}
