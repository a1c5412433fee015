//! Source registry: every name list the policy is computed from.
//!
//! Lists are keyed by (category, source id); at most one list exists per key.
//! Only the coordinator holds a mutable registry.

pub mod list;
pub mod loader;
pub mod membership;

pub use list::NameList;
pub use membership::{MapNames, NameMembership, NameStore, TrieNames};

use rpz_core::{IntelBatch, ListType, PolicyAction, SourceFormat, TagMask, TaggedName};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::DataSource;
use crate::reaper;
use crate::SrvError;

/// Lower-case, fully qualified form of `raw`, or `None` if it is not a valid name.
pub fn canonical_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('.');
    if trimmed.is_empty()
        || !trimmed
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'*'))
    {
        return None;
    }
    let lower = format!("{}.", trimmed.to_ascii_lowercase());
    hickory_proto::rr::Name::from_ascii(&lower).ok()?;
    Some(lower)
}

/// One-line description of a list, for RPZ-LIST-SOURCES.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub name: String,
    pub list_type: ListType,
    pub format: SourceFormat,
    pub datasource: DataSource,
    pub names: usize,
    pub pending_evictions: usize,
    pub description: String,
}

/// All source lists, ordered by category precedence then name.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    lists: BTreeMap<(ListType, String), NameList>,
    reaper_interval: i64,
}

impl SourceRegistry {
    pub fn new(reaper_interval_secs: u64) -> Self {
        Self {
            lists: BTreeMap::new(),
            reaper_interval: i64::try_from(reaper_interval_secs.max(1)).unwrap_or(i64::MAX),
        }
    }

    pub const fn reaper_interval(&self) -> i64 {
        self.reaper_interval
    }

    /// Register a list. Fails if one with the same category and name exists.
    pub fn add_list(&mut self, list: NameList) -> crate::Result<()> {
        let key = (list.list_type(), list.name().to_string());
        if self.lists.contains_key(&key) {
            return Err(SrvError::Source(format!(
                "duplicate list {}/{}",
                key.0, key.1
            )));
        }
        self.lists.insert(key, list);
        Ok(())
    }

    /// Replace the contents of a list, creating it on first use.
    ///
    /// Returns true if the list was newly created.
    pub fn replace_list(
        &mut self,
        list_type: ListType,
        source: &str,
        datasource: DataSource,
        entries: Vec<TaggedName>,
    ) -> crate::Result<bool> {
        let key = (list_type, source.to_string());
        if let Some(list) = self.lists.get_mut(&key) {
            list.replace_entries(entries)?;
            return Ok(false);
        }
        self.lists.insert(
            key,
            NameList::with_entries(source, list_type, datasource, entries),
        );
        Ok(true)
    }

    pub fn get(&self, list_type: ListType, source: &str) -> Option<&NameList> {
        self.lists.get(&(list_type, source.to_string()))
    }

    pub fn get_mut(&mut self, list_type: ListType, source: &str) -> Option<&mut NameList> {
        self.lists.get_mut(&(list_type, source.to_string()))
    }

    /// Category of `source`: the given one if it exists there, otherwise the
    /// only category holding a list of that name.
    pub fn resolve(&self, list_type: Option<ListType>, source: &str) -> crate::Result<ListType> {
        if let Some(lt) = list_type {
            return self
                .get(lt, source)
                .map(|_| lt)
                .ok_or_else(|| SrvError::Source(format!("unknown source {lt}/{source}")));
        }
        let mut found = ListType::ALL
            .into_iter()
            .filter(|lt| self.get(*lt, source).is_some());
        match (found.next(), found.next()) {
            (Some(lt), None) => Ok(lt),
            (None, _) => Err(SrvError::Source(format!("unknown source {source}"))),
            (Some(_), Some(_)) => Err(SrvError::Source(format!(
                "source {source} exists in several categories; list type required"
            ))),
        }
    }

    pub fn lists(&self) -> impl Iterator<Item = &NameList> {
        self.lists.values()
    }

    pub fn lists_of(&self, list_type: ListType) -> impl Iterator<Item = &NameList> {
        self.lists
            .range((list_type, String::new())..)
            .take_while(move |((lt, _), _)| *lt == list_type)
            .map(|(_, list)| list)
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// True if any list of `list_type` holds `name`.
    pub fn in_category(&self, list_type: ListType, name: &str) -> bool {
        self.lists_of(list_type).any(|l| l.contains(name))
    }

    /// Greylists holding `name`.
    pub fn greylist_hits<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a NameList> {
        self.lists_of(ListType::Greylist)
            .filter(move |l| l.contains(name))
    }

    /// True if `name` is enumerated by a blacklist or greylist, which makes
    /// it a candidate for the output zone.
    ///
    /// Trie lists are lookup-only: they decide the action for a candidate
    /// but never make a name a candidate themselves.
    pub fn is_candidate(&self, name: &str) -> bool {
        [ListType::Blacklist, ListType::Greylist].into_iter().any(|lt| {
            self.lists_of(lt)
                .any(|l| l.is_mutable() && l.contains(name))
        })
    }

    /// Tag masks of every greylist entry for `name`, OR-ed together.
    pub fn merged_tags(&self, name: &str) -> TagMask {
        self.greylist_hits(name)
            .filter_map(|l| l.get(name))
            .fold(TagMask::EMPTY, |acc, e| acc | e.tags)
    }

    /// Action flags (see [`PolicyAction::flag`]) of every greylist entry for `name`, OR-ed.
    pub fn merged_action_flags(&self, name: &str) -> u8 {
        self.greylist_hits(name)
            .filter_map(|l| l.get(name))
            .fold(0, |acc, e| acc | e.action.flag())
    }

    /// Apply a verified feed batch.
    ///
    /// The whole batch is checked before anything changes: an unknown source,
    /// a trie-backed target, a bad name or an unknown tag rejects it. Removals
    /// are applied before additions. Returns the canonical names touched.
    pub fn apply_batch(&mut self, batch: &IntelBatch, now: i64) -> crate::Result<Vec<String>> {
        let list_type = self.resolve(batch.list_type, &batch.source)?;
        let interval = self.reaper_interval;
        let list = self
            .get(list_type, &batch.source)
            .ok_or_else(|| SrvError::Feed(format!("unknown source {}", batch.source)))?;
        if !list.is_mutable() {
            return Err(SrvError::Feed(format!(
                "{list_type}/{} is read-only",
                batch.source
            )));
        }

        let mut additions = Vec::with_capacity(batch.added.len());
        for add in &batch.added {
            let name = canonical_name(&add.name)
                .ok_or_else(|| SrvError::Feed(format!("invalid name {:?}", add.name)))?;
            let tags = add
                .tag_mask()
                .map_err(|e| SrvError::Feed(format!("{}: {e}", add.name)))?;
            let ttl = add.ttl.and_then(|t| i64::try_from(t).ok());
            let expires = match (list_type, ttl) {
                (ListType::Greylist, Some(ttl)) => {
                    Some(reaper::bucket_ceil(now.saturating_add(ttl), interval))
                }
                _ => None,
            };
            additions.push(TaggedName {
                name,
                tags,
                action: PolicyAction::Unknown,
                source: batch.source.clone(),
                added_at: now,
                expires,
            });
        }
        let mut removals = Vec::with_capacity(batch.removed.len());
        for rem in &batch.removed {
            let name = canonical_name(&rem.name)
                .ok_or_else(|| SrvError::Feed(format!("invalid name {:?}", rem.name)))?;
            removals.push(name);
        }

        let list = self
            .get_mut(list_type, &batch.source)
            .ok_or_else(|| SrvError::Feed(format!("unknown source {}", batch.source)))?;
        let mut touched = Vec::with_capacity(removals.len() + additions.len());
        for name in removals {
            list.remove(&name)?;
            touched.push(name);
        }
        for entry in additions {
            touched.push(entry.name.clone());
            list.insert(entry)?;
        }
        Ok(touched)
    }

    /// Add one name to a mutable list.
    pub fn add_name(&mut self, list_type: ListType, entry: TaggedName) -> crate::Result<()> {
        let source = entry.source.clone();
        self.get_mut(list_type, &source)
            .ok_or_else(|| SrvError::Source(format!("unknown source {list_type}/{source}")))?
            .insert(entry)
    }

    /// Remove one name from a mutable list. Returns whether it was listed.
    pub fn remove_name(
        &mut self,
        list_type: ListType,
        source: &str,
        name: &str,
    ) -> crate::Result<bool> {
        Ok(self
            .get_mut(list_type, source)
            .ok_or_else(|| SrvError::Source(format!("unknown source {list_type}/{source}")))?
            .remove(name)?
            .is_some())
    }

    /// Evict every greylist entry due at `bucket`.
    pub fn sweep(&mut self, bucket: i64) -> Vec<TaggedName> {
        self.lists
            .values_mut()
            .filter(|l| l.list_type() == ListType::Greylist)
            .flat_map(|l| l.sweep(bucket))
            .collect()
    }

    pub fn summaries(&self) -> Vec<SourceSummary> {
        self.lists
            .values()
            .map(|l| SourceSummary {
                name: l.name().to_string(),
                list_type: l.list_type(),
                format: l.format(),
                datasource: l.datasource(),
                names: l.len(),
                pending_evictions: l.pending_evictions(),
                description: l.description().to_string(),
            })
            .collect()
    }
}
