//! Policy evaluation: what the output zone says about one name.
//!
//! Precedence is fixed. A whitelist hit always wins, then any blacklist hit,
//! then the greylist rules. Evaluation only reads the registry.

use rpz_core::{ListType, PolicyAction, TagMask};
use serde::Serialize;

use crate::sources::SourceRegistry;

/// Typed policy thresholds and actions, parsed from `[policy]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicySettings {
    pub blacklist_action: PolicyAction,
    /// Distinct greylist hits needed for `num_sources_action` (inclusive).
    pub num_sources: usize,
    pub num_sources_action: PolicyAction,
    /// Primary-source tag count that must be exceeded for `num_tags_action`.
    pub num_tags: u32,
    pub num_tags_action: PolicyAction,
    pub black_tags: TagMask,
    pub black_tags_action: PolicyAction,
    pub primary_source: Option<String>,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            blacklist_action: PolicyAction::Nxdomain,
            num_sources: 2,
            num_sources_action: PolicyAction::Nxdomain,
            num_tags: 2,
            num_tags_action: PolicyAction::Nxdomain,
            black_tags: TagMask::EMPTY,
            black_tags_action: PolicyAction::Nxdomain,
            primary_source: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    settings: PolicySettings,
}

impl PolicyEngine {
    pub const fn new(settings: PolicySettings) -> Self {
        Self { settings }
    }

    pub const fn settings(&self) -> &PolicySettings {
        &self.settings
    }

    /// Effective action for `name`. `Whitelist` means "not blocked".
    pub fn compute_action(&self, registry: &SourceRegistry, name: &str) -> PolicyAction {
        if registry.in_category(ListType::Whitelist, name) {
            return PolicyAction::Whitelist;
        }
        if registry.in_category(ListType::Blacklist, name) {
            return self.settings.blacklist_action;
        }
        if registry.in_category(ListType::Greylist, name) {
            return self.compute_greylist_action(registry, name);
        }
        PolicyAction::Whitelist
    }

    /// Greylist rules, in order: source count, black tags, tag count.
    pub fn compute_greylist_action(&self, registry: &SourceRegistry, name: &str) -> PolicyAction {
        let s = &self.settings;
        let hits: Vec<&str> = registry
            .greylist_hits(name)
            .map(crate::sources::NameList::name)
            .collect();

        if hits.len() >= s.num_sources {
            return s.num_sources_action;
        }

        let Some(primary) = s.primary_source.as_deref() else {
            return PolicyAction::Whitelist;
        };
        if !hits.contains(&primary) {
            return PolicyAction::Whitelist;
        }
        let tags = registry
            .get(ListType::Greylist, primary)
            .and_then(|l| l.get(name))
            .map_or(TagMask::EMPTY, |e| e.tags);

        if !s.black_tags.is_empty() && tags.intersects(s.black_tags) {
            return s.black_tags_action;
        }
        if tags.count() > s.num_tags {
            return s.num_tags_action;
        }
        PolicyAction::Whitelist
    }

    /// Action used to decide output-zone membership.
    ///
    /// Names no enumerable blacklist or greylist holds are never emitted, so
    /// incremental updates and full rebuilds agree on the same sources.
    pub fn output_action(&self, registry: &SourceRegistry, name: &str) -> PolicyAction {
        if registry.is_candidate(name) {
            self.compute_action(registry, name)
        } else {
            PolicyAction::Whitelist
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataSource;
    use crate::sources::NameList;
    use rpz_core::TaggedName;

    fn registry() -> SourceRegistry {
        let mut reg = SourceRegistry::new(60);
        for (name, lt) in [
            ("allow", ListType::Whitelist),
            ("block", ListType::Blacklist),
            ("tapir", ListType::Greylist),
            ("other", ListType::Greylist),
            ("third", ListType::Greylist),
        ] {
            reg.add_list(NameList::new_map(name, lt, DataSource::Feed))
                .unwrap();
        }
        reg
    }

    fn put(reg: &mut SourceRegistry, lt: ListType, source: &str, name: &str, tags: TagMask) {
        let entry = TaggedName {
            tags,
            ..TaggedName::bare(name, source)
        };
        reg.add_name(lt, entry).unwrap();
    }

    fn engine() -> PolicyEngine {
        PolicyEngine::new(PolicySettings {
            blacklist_action: PolicyAction::Nxdomain,
            num_sources: 2,
            num_sources_action: PolicyAction::Nodata,
            num_tags: 2,
            num_tags_action: PolicyAction::Drop,
            black_tags: TagMask::LIKELY_MALWARE,
            black_tags_action: PolicyAction::Nxdomain,
            primary_source: Some("tapir".into()),
        })
    }

    #[test]
    fn test_whitelist_beats_blacklist() {
        let mut reg = registry();
        put(&mut reg, ListType::Blacklist, "block", "both.example.", TagMask::EMPTY);
        put(&mut reg, ListType::Whitelist, "allow", "both.example.", TagMask::EMPTY);
        assert_eq!(engine().compute_action(&reg, "both.example."), PolicyAction::Whitelist);
    }

    #[test]
    fn test_blacklist_action() {
        let mut reg = registry();
        put(&mut reg, ListType::Blacklist, "block", "evil.example.", TagMask::EMPTY);
        put(&mut reg, ListType::Greylist, "tapir", "evil.example.", TagMask::EMPTY);
        assert_eq!(engine().compute_action(&reg, "evil.example."), PolicyAction::Nxdomain);
    }

    #[test]
    fn test_unlisted_is_not_blocked() {
        let reg = registry();
        assert_eq!(engine().compute_action(&reg, "fine.example."), PolicyAction::Whitelist);
    }

    #[test]
    fn test_greylist_source_threshold() {
        let mut reg = registry();
        put(&mut reg, ListType::Greylist, "other", "grey.example.", TagMask::EMPTY);
        assert_eq!(engine().compute_action(&reg, "grey.example."), PolicyAction::Whitelist);

        put(&mut reg, ListType::Greylist, "third", "grey.example.", TagMask::EMPTY);
        assert_eq!(engine().compute_action(&reg, "grey.example."), PolicyAction::Nodata);
    }

    #[test]
    fn test_tag_count_must_exceed_threshold() {
        let mut reg = registry();
        let two = TagMask::NEW_NAME | TagMask::HIGH_VOLUME;
        put(&mut reg, ListType::Greylist, "tapir", "t.example.", two);
        assert_eq!(engine().compute_action(&reg, "t.example."), PolicyAction::Whitelist);

        put(&mut reg, ListType::Greylist, "tapir", "t.example.", two | TagMask::BAD_IP);
        assert_eq!(engine().compute_action(&reg, "t.example."), PolicyAction::Drop);
    }

    #[test]
    fn test_black_tags_checked_before_tag_count() {
        let mut reg = registry();
        let mask = TagMask::LIKELY_MALWARE | TagMask::NEW_NAME | TagMask::BAD_IP;
        put(&mut reg, ListType::Greylist, "tapir", "m.example.", mask);
        assert_eq!(engine().compute_action(&reg, "m.example."), PolicyAction::Nxdomain);
    }

    #[test]
    fn test_tags_on_other_sources_do_not_count() {
        let mut reg = registry();
        let many = TagMask::NEW_NAME | TagMask::HIGH_VOLUME | TagMask::BAD_IP;
        put(&mut reg, ListType::Greylist, "other", "o.example.", many);
        assert_eq!(engine().compute_action(&reg, "o.example."), PolicyAction::Whitelist);
    }

    #[test]
    fn test_no_primary_source() {
        let mut reg = registry();
        put(&mut reg, ListType::Greylist, "tapir", "p.example.", TagMask(0xff));
        let engine = PolicyEngine::default();
        assert_eq!(engine.compute_action(&reg, "p.example."), PolicyAction::Whitelist);
    }
}
