//! Zone synthesis: source membership in, policy records out.

use rpz_core::ListType;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use super::apex::ZoneApex;
use super::chain::DiffChain;
use super::snapshot::{IncrementalDiff, PolicyEntry, ZoneSnapshot};
use crate::policy::PolicyEngine;
use crate::sources::SourceRegistry;

/// Mutable zone state owned by the coordinator: the current snapshot and the
/// diff chain leading to it. Both are copy-on-write so published readers
/// keep a consistent view.
#[derive(Debug, Clone)]
pub struct ZoneState {
    snapshot: Arc<ZoneSnapshot>,
    chain: Arc<DiffChain>,
}

impl ZoneState {
    pub fn new(initial: ZoneSnapshot, max_chain: usize) -> Self {
        let snapshot = Arc::new(initial);
        let chain = Arc::new(DiffChain::new(Arc::clone(&snapshot), max_chain));
        Self { snapshot, chain }
    }

    pub const fn snapshot(&self) -> &Arc<ZoneSnapshot> {
        &self.snapshot
    }

    pub const fn chain(&self) -> &Arc<DiffChain> {
        &self.chain
    }

    pub fn serial(&self) -> u32 {
        self.snapshot.serial()
    }

    fn push(&mut self, diff: IncrementalDiff) -> Arc<IncrementalDiff> {
        let diff = Arc::new(diff);
        Arc::make_mut(&mut self.snapshot).apply(&diff);
        Arc::make_mut(&mut self.chain).push(Arc::clone(&diff));
        diff
    }

    /// Record a content change as the next serial.
    pub fn commit(&mut self, removed: Vec<PolicyEntry>, added: Vec<PolicyEntry>) -> Arc<IncrementalDiff> {
        let from = self.serial();
        self.push(IncrementalDiff {
            from_serial: from,
            to_serial: from.wrapping_add(1),
            removed,
            added,
        })
    }

    /// Move the serial to `serial` without changing content.
    ///
    /// An empty diff is chained so IXFR clients at the old serial can follow.
    pub fn bump(&mut self, serial: u32) -> Arc<IncrementalDiff> {
        let from = self.serial();
        self.push(IncrementalDiff {
            from_serial: from,
            to_serial: serial,
            removed: Vec::new(),
            added: Vec::new(),
        })
    }
}

/// Builds full snapshots and incremental diffs from the source registry.
#[derive(Debug, Clone)]
pub struct RpzSynthesizer {
    apex: Arc<ZoneApex>,
    policy: PolicyEngine,
}

impl RpzSynthesizer {
    pub const fn new(apex: Arc<ZoneApex>, policy: PolicyEngine) -> Self {
        Self { apex, policy }
    }

    pub fn apex(&self) -> &Arc<ZoneApex> {
        &self.apex
    }

    pub const fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    /// Output entry for one trigger, or `None` if it is not blocked.
    pub fn entry_for(&self, registry: &SourceRegistry, name: &str) -> Option<PolicyEntry> {
        let action = self.policy.output_action(registry, name);
        match self.apex.policy_record(name, action) {
            Ok(Some(record)) => Some(PolicyEntry {
                name: name.to_string(),
                owner: self.apex.owner_key(name),
                action,
                record,
            }),
            Ok(None) => None,
            Err(e) => {
                warn!(name, error = %e, "skipping policy entry");
                None
            }
        }
    }

    /// Build the whole zone from scratch.
    ///
    /// Candidates are every enumerable blacklist name and every greylist
    /// name, minus whitelisted names; each candidate gets its computed
    /// action and is emitted if that action blocks.
    pub fn build_full_snapshot(&self, registry: &SourceRegistry, serial: u32) -> ZoneSnapshot {
        let whitelisted = |name: &str| registry.in_category(ListType::Whitelist, name);

        let mut blacklisted: BTreeSet<&str> = BTreeSet::new();
        for list in registry.lists_of(ListType::Blacklist) {
            let Some(entries) = list.entries() else {
                continue;
            };
            blacklisted.extend(
                entries
                    .map(|e| e.name.as_str())
                    .filter(|name| !whitelisted(name)),
            );
        }

        let mut greylisted: BTreeSet<&str> = BTreeSet::new();
        for list in registry.lists_of(ListType::Greylist) {
            let Some(entries) = list.entries() else {
                continue;
            };
            greylisted.extend(
                entries
                    .map(|e| e.name.as_str())
                    .filter(|name| !blacklisted.contains(name) && !whitelisted(name)),
            );
        }

        let entries = blacklisted
            .into_iter()
            .chain(greylisted)
            .filter_map(|name| self.entry_for(registry, name));
        let snapshot = ZoneSnapshot::from_entries(Arc::clone(&self.apex), serial, entries);
        debug!(serial, entries = snapshot.len(), "built full snapshot");
        snapshot
    }

    /// Reconcile the zone for the names a batch touched.
    ///
    /// Each name's action is recomputed and compared with the published
    /// entry. Returns the committed diff, or `None` if nothing changed (the
    /// serial is then left alone).
    pub fn build_incremental_diff<I, S>(
        &self,
        registry: &SourceRegistry,
        zone: &mut ZoneState,
        names: I,
    ) -> Option<Arc<IncrementalDiff>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut removed = Vec::new();
        let mut added = Vec::new();

        for name in names {
            let name = name.as_ref();
            if !seen.insert(name.to_string()) {
                continue;
            }
            let current = zone.snapshot().lookup(name);
            let next = self.entry_for(registry, name);
            match (current, next) {
                (Some(old), Some(new)) if old.action == new.action => {}
                (Some(old), next) => {
                    removed.push(old.clone());
                    added.extend(next);
                }
                (None, Some(new)) => added.push(new),
                (None, None) => {}
            }
        }

        if removed.is_empty() && added.is_empty() {
            return None;
        }
        Some(zone.commit(removed, added))
    }

    /// Rebuild from scratch and publish the difference as one diff.
    pub fn rebuild(&self, registry: &SourceRegistry, zone: &mut ZoneState) -> Option<Arc<IncrementalDiff>> {
        let fresh = self.build_full_snapshot(registry, zone.serial());
        let current = zone.snapshot();

        let mut by_owner: BTreeMap<&str, (Option<&PolicyEntry>, Option<&PolicyEntry>)> =
            BTreeMap::new();
        for e in current.entries() {
            by_owner.entry(e.owner.as_str()).or_default().0 = Some(e);
        }
        for e in fresh.entries() {
            by_owner.entry(e.owner.as_str()).or_default().1 = Some(e);
        }

        let mut removed = Vec::new();
        let mut added = Vec::new();
        for (old, new) in by_owner.into_values() {
            match (old, new) {
                (Some(o), Some(n)) if o.action == n.action => {}
                (old, new) => {
                    removed.extend(old.cloned());
                    added.extend(new.cloned());
                }
            }
        }

        if removed.is_empty() && added.is_empty() {
            return None;
        }
        Some(zone.commit(removed, added))
    }
}
