//! Output zone state at one serial, and the steps between serials.

use hickory_proto::rr::Record;
use rpz_core::PolicyAction;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::apex::ZoneApex;

/// One policy record in the output zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEntry {
    /// Trigger name, e.g. `evil.example.`
    pub name: String,
    /// Owner key in the zone, e.g. `evil.example.rpz.local.`
    pub owner: String,
    pub action: PolicyAction,
    pub record: Record,
}

/// Full output zone state at one serial.
#[derive(Debug, Clone)]
pub struct ZoneSnapshot {
    apex: Arc<ZoneApex>,
    serial: u32,
    entries: BTreeMap<String, PolicyEntry>,
}

impl ZoneSnapshot {
    pub fn empty(apex: Arc<ZoneApex>, serial: u32) -> Self {
        Self {
            apex,
            serial,
            entries: BTreeMap::new(),
        }
    }

    pub fn from_entries(
        apex: Arc<ZoneApex>,
        serial: u32,
        entries: impl IntoIterator<Item = PolicyEntry>,
    ) -> Self {
        Self {
            apex,
            serial,
            entries: entries.into_iter().map(|e| (e.owner.clone(), e)).collect(),
        }
    }

    pub fn apex(&self) -> &ZoneApex {
        &self.apex
    }

    pub fn apex_arc(&self) -> Arc<ZoneApex> {
        Arc::clone(&self.apex)
    }

    pub const fn serial(&self) -> u32 {
        self.serial
    }

    pub fn soa(&self) -> Record {
        self.apex.soa_record(self.serial)
    }

    pub fn ns(&self) -> Vec<Record> {
        self.apex.ns_records()
    }

    /// Entries in owner order.
    pub fn entries(&self) -> impl Iterator<Item = &PolicyEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, owner: &str) -> Option<&PolicyEntry> {
        self.entries.get(owner)
    }

    /// Entry for a trigger name.
    pub fn lookup(&self, trigger: &str) -> Option<&PolicyEntry> {
        self.entries.get(&self.apex.owner_key(trigger))
    }

    /// Apply one diff in place and take its target serial.
    pub fn apply(&mut self, diff: &IncrementalDiff) {
        for entry in &diff.removed {
            self.entries.remove(&entry.owner);
        }
        for entry in &diff.added {
            self.entries.insert(entry.owner.clone(), entry.clone());
        }
        self.serial = diff.to_serial;
    }

    /// True if both snapshots publish the same entries, whatever their serials.
    pub fn same_content(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

/// One step of zone history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementalDiff {
    pub from_serial: u32,
    pub to_serial: u32,
    pub removed: Vec<PolicyEntry>,
    pub added: Vec<PolicyEntry>,
}

impl IncrementalDiff {
    /// True if the step changes no records (a serial bump).
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }

    /// Records touched by the step.
    pub fn len(&self) -> usize {
        self.removed.len() + self.added.len()
    }
}
