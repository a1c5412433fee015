//! Bounded IXFR history with compaction into a base snapshot.

use std::collections::VecDeque;
use std::sync::Arc;

use super::snapshot::{IncrementalDiff, ZoneSnapshot};

/// Retained zone history for IXFR.
///
/// `base` is the zone at the serial the oldest retained diff starts from.
/// When the chain grows past its bound, the oldest diff is folded into
/// `base`, so replaying `base` plus every diff always yields the current zone.
#[derive(Debug, Clone)]
pub struct DiffChain {
    base: Arc<ZoneSnapshot>,
    diffs: VecDeque<Arc<IncrementalDiff>>,
    max_len: usize,
}

impl DiffChain {
    pub fn new(base: Arc<ZoneSnapshot>, max_len: usize) -> Self {
        Self {
            base,
            diffs: VecDeque::new(),
            max_len: max_len.max(1),
        }
    }

    pub fn base(&self) -> &ZoneSnapshot {
        &self.base
    }

    /// Serial of the oldest state the chain can replay from.
    pub fn oldest_serial(&self) -> u32 {
        self.base.serial()
    }

    pub fn len(&self) -> usize {
        self.diffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<IncrementalDiff>> {
        self.diffs.iter()
    }

    /// Append a diff, compacting the oldest ones into the base if needed.
    pub fn push(&mut self, diff: Arc<IncrementalDiff>) {
        self.diffs.push_back(diff);
        while self.diffs.len() > self.max_len {
            if let Some(oldest) = self.diffs.pop_front() {
                Arc::make_mut(&mut self.base).apply(&oldest);
            }
        }
    }

    /// Diffs leading from `serial` to the newest one, or `None` if no
    /// retained diff starts at `serial`.
    pub fn diffs_from(&self, serial: u32) -> Option<Vec<Arc<IncrementalDiff>>> {
        let start = self.diffs.iter().position(|d| d.from_serial == serial)?;
        Some(self.diffs.range(start..).cloned().collect())
    }

    /// Rebuild the newest state from the base.
    pub fn replay(&self) -> ZoneSnapshot {
        let mut snapshot = (*self.base).clone();
        for diff in &self.diffs {
            snapshot.apply(diff);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::apex::ZoneApex;
    use crate::zone::snapshot::PolicyEntry;
    use rpz_core::PolicyAction;

    fn apex() -> Arc<ZoneApex> {
        Arc::new(ZoneApex::new("rpz.example.", "ns1.example.", "admin.example.", &[], 60).unwrap())
    }

    fn add(apex: &ZoneApex, from: u32, name: &str) -> Arc<IncrementalDiff> {
        Arc::new(IncrementalDiff {
            from_serial: from,
            to_serial: from + 1,
            removed: vec![],
            added: vec![PolicyEntry {
                name: name.into(),
                owner: apex.owner_key(name),
                action: PolicyAction::Nxdomain,
                    record: apex.policy_record(name, PolicyAction::Nxdomain).unwrap().unwrap(),
            }],
        })
    }

    #[test]
    fn test_diffs_from_exact_serial_only() {
        let apex = apex();
        let mut chain = DiffChain::new(Arc::new(ZoneSnapshot::empty(apex.clone(), 1)), 10);
        chain.push(add(&apex, 1, "a.example."));
        chain.push(add(&apex, 2, "b.example."));
        chain.push(add(&apex, 3, "c.example."));

        let from2 = chain.diffs_from(2).unwrap();
        assert_eq!(from2.len(), 2);
        assert_eq!(from2[0].from_serial, 2);
        assert!(chain.diffs_from(9).is_none());
        assert!(chain.diffs_from(4).is_none());
    }

    #[test]
    fn test_compaction_keeps_replay_exact() {
        let apex = apex();
        let mut chain = DiffChain::new(Arc::new(ZoneSnapshot::empty(apex.clone(), 1)), 2);
        for (i, name) in ["a.example.", "b.example.", "c.example.", "d.example."]
            .iter()
            .enumerate()
        {
            chain.push(add(&apex, 1 + u32::try_from(i).unwrap(), name));
        }
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.oldest_serial(), 3);
        assert_eq!(chain.base().len(), 2);

        let replayed = chain.replay();
        assert_eq!(replayed.serial(), 5);
        assert_eq!(replayed.len(), 4);
        assert!(chain.diffs_from(1).is_none());
        assert!(chain.diffs_from(3).is_some());
    }
}
