//! Name-membership backends for source lists.

use fst::Set;
use rpz_core::TaggedName;
use std::collections::{hash_map, BTreeSet, HashMap};
use std::fmt;

use crate::SrvError;

/// Lookup capability every source list provides.
pub trait NameMembership {
    /// True if `name` (canonical form) is listed.
    fn contains(&self, name: &str) -> bool;

    /// Number of names listed.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hash-map-backed names. Mutable, enumerable, keeps per-name metadata.
#[derive(Debug, Clone, Default)]
pub struct MapNames {
    entries: HashMap<String, TaggedName>,
}

impl MapNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry, returning the previous one.
    pub fn insert(&mut self, entry: TaggedName) -> Option<TaggedName> {
        self.entries.insert(entry.name.clone(), entry)
    }

    pub fn remove(&mut self, name: &str) -> Option<TaggedName> {
        self.entries.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&TaggedName> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> hash_map::Values<'_, String, TaggedName> {
        self.entries.values()
    }
}

impl FromIterator<TaggedName> for MapNames {
    fn from_iter<I: IntoIterator<Item = TaggedName>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|e| (e.name.clone(), e)).collect(),
        }
    }
}

impl NameMembership for MapNames {
    fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Compressed-trie-backed names (an `fst` set). Immutable once built.
#[derive(Clone)]
pub struct TrieNames {
    set: Set<Vec<u8>>,
}

impl TrieNames {
    /// Build from names in any order; duplicates are collapsed.
    pub fn from_names<I, S>(names: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sorted: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        let set = Set::from_iter(sorted.iter())
            .map_err(|e| SrvError::Source(format!("failed to build trie: {e}")))?;
        Ok(Self { set })
    }

    /// Open a serialized `fst` set.
    pub fn from_bytes(bytes: Vec<u8>) -> crate::Result<Self> {
        let set = Set::new(bytes).map_err(|e| SrvError::Source(format!("invalid fst set: {e}")))?;
        Ok(Self { set })
    }

    /// Serialized form, loadable with [`TrieNames::from_bytes`].
    pub fn as_bytes(&self) -> &[u8] {
        self.set.as_fst().as_bytes()
    }
}

impl fmt::Debug for TrieNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrieNames").field("len", &self.set.len()).finish()
    }
}

impl NameMembership for TrieNames {
    fn contains(&self, name: &str) -> bool {
        self.set.contains(name)
    }

    fn len(&self) -> usize {
        self.set.len()
    }
}

/// Backing store of one list.
#[derive(Debug, Clone)]
pub enum NameStore {
    Map(MapNames),
    Trie(TrieNames),
}

impl NameMembership for NameStore {
    fn contains(&self, name: &str) -> bool {
        match self {
            Self::Map(m) => m.contains(name),
            Self::Trie(t) => t.contains(name),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Map(m) => m.len(),
            Self::Trie(t) => t.len(),
        }
    }
}
