//! Control-plane commands, run on the coordinator task.

use rpz_core::{
    Command, CommandRequest, CommandResponse, ListType, PolicyAction, TagMask, TaggedName,
};
use serde::Serialize;
use tracing::{info, warn};

use super::Coordinator;
use crate::sources::canonical_name;
use crate::SrvError;

/// Actions a source can assert for a name.
const ASSERTABLE: [PolicyAction; 4] = [
    PolicyAction::Whitelist,
    PolicyAction::Nxdomain,
    PolicyAction::Nodata,
    PolicyAction::Drop,
];

/// Reply body of RPZ-LOOKUP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupReport {
    pub name: String,
    /// `category/source` of every list holding the name.
    pub lists: Vec<String>,
    /// Greylist tags, merged across sources.
    pub tags: Vec<&'static str>,
    /// Actions greylist sources asserted.
    pub asserted: Vec<PolicyAction>,
    /// What the policy makes of the name now.
    pub action: PolicyAction,
    /// Action in the published zone, if the name is there.
    pub published: Option<PolicyAction>,
}

fn domain(raw: &str) -> crate::Result<String> {
    canonical_name(raw).ok_or_else(|| SrvError::Command(format!("invalid domain {raw:?}")))
}

impl Coordinator {
    /// Run one command. Failures are reported in the response and leave
    /// the zone untouched.
    pub(super) fn on_command(&mut self, request: &CommandRequest, now: i64) -> CommandResponse {
        let old_serial = self.zone.serial();
        match self.execute(request, now) {
            Ok(message) => CommandResponse::ok(message, old_serial, self.zone.serial()),
            Err(e) => {
                warn!(command = %request.command, zone = %request.zone, error = %e, "command failed");
                CommandResponse::failure(e, old_serial)
            }
        }
    }

    fn execute(&mut self, request: &CommandRequest, now: i64) -> crate::Result<String> {
        request.validate()?;
        if !self.synth.apex().is_zone(&request.zone) {
            return Err(SrvError::Command(format!("unknown zone {}", request.zone)));
        }
        match request.command {
            Command::Bump => Ok(self.bump(now)),
            Command::RpzAdd => self.add(request, now),
            Command::RpzRemove => self.remove(request),
            Command::RpzLookup => self.lookup(request),
            Command::RpzListSources => Ok(serde_json::to_string(&self.registry.summaries())?),
        }
    }

    /// Wall-clock serial, or one past the current if the clock is behind.
    fn bump(&mut self, now: i64) -> String {
        let current = self.zone.serial();
        let wall = u32::try_from(now).unwrap_or(0);
        let next = if wall > current {
            wall
        } else {
            current.wrapping_add(1)
        };
        let diff = self.zone.bump(next);
        self.publish(&diff, "bump");
        format!("serial bumped from {current} to {next}")
    }

    /// Category of the list a RPZ-ADD or RPZ-REMOVE targets. Only greylists
    /// take command edits; the other categories follow their files and feeds.
    fn greylist(&self, request: &CommandRequest) -> crate::Result<ListType> {
        let list_type = self.registry.resolve(request.list_type, &request.source)?;
        if list_type != ListType::Greylist {
            return Err(SrvError::Command(format!(
                "{list_type}/{} is not a greylist",
                request.source
            )));
        }
        Ok(list_type)
    }

    fn add(&mut self, request: &CommandRequest, now: i64) -> crate::Result<String> {
        let name = domain(&request.domain)?;
        let list_type = self.greylist(request)?;
        // Keep feed tags on a re-add; only the asserted action changes.
        let tags = self
            .registry
            .get(list_type, &request.source)
            .and_then(|l| l.get(&name))
            .map_or(TagMask::EMPTY, |e| e.tags);
        self.registry.add_name(
            list_type,
            TaggedName {
                name: name.clone(),
                tags,
                action: request.policy.unwrap_or_default(),
                source: request.source.clone(),
                added_at: now,
                expires: None,
            },
        )?;
        info!(name = %name, list = %format!("{list_type}/{}", request.source), "added by command");
        let done = format!("added {name} to {list_type}/{}", request.source);
        Ok(self.reconcile(&name, &done))
    }

    fn remove(&mut self, request: &CommandRequest) -> crate::Result<String> {
        let name = domain(&request.domain)?;
        let list_type = self.greylist(request)?;
        if !self
            .registry
            .remove_name(list_type, &request.source, &name)?
        {
            return Ok(format!("{name} not in {list_type}/{}", request.source));
        }
        info!(name = %name, list = %format!("{list_type}/{}", request.source), "removed by command");
        let done = format!("removed {name} from {list_type}/{}", request.source);
        Ok(self.reconcile(&name, &done))
    }

    fn lookup(&self, request: &CommandRequest) -> crate::Result<String> {
        let name = domain(&request.domain)?;
        let flags = self.registry.merged_action_flags(&name);
        let report = LookupReport {
            lists: self
                .registry
                .lists()
                .filter(|l| l.contains(&name))
                .map(|l| format!("{}/{}", l.list_type(), l.name()))
                .collect(),
            tags: self.registry.merged_tags(&name).names(),
            asserted: ASSERTABLE
                .into_iter()
                .filter(|a| flags & a.flag() != 0)
                .collect(),
            action: self.synth.policy().output_action(&self.registry, &name),
            published: self.zone.snapshot().lookup(&name).map(|e| e.action),
            name,
        };
        Ok(serde_json::to_string(&report)?)
    }

    /// Publish whatever `name`'s change did to the zone.
    fn reconcile(&mut self, name: &str, done: &str) -> String {
        match self
            .synth
            .build_incremental_diff(&self.registry, &mut self.zone, [name])
        {
            Some(diff) => {
                self.publish(&diff, "command");
                format!("{done}; zone at serial {}", diff.to_serial)
            }
            None => format!("{done}; zone unchanged"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::coordinator::test_support::coordinator;
    use super::*;
    use rpz_core::{IntelAddition, IntelBatch};
    use std::sync::Arc;

    const ZONE: &str = "rpz.example.";

    fn add(domain: &str, list_type: ListType, source: &str) -> CommandRequest {
        CommandRequest::new(Command::RpzAdd, ZONE)
            .with_domain(domain)
            .with_source(list_type, source)
    }

    #[test]
    fn test_bump_uses_wall_clock_then_increments() {
        let mut coord = coordinator(Arc::default());
        let resp = coord.on_command(&CommandRequest::new(Command::Bump, ZONE), 1_700_000_000);
        assert!(!resp.error);
        assert_eq!((resp.old_serial, resp.new_serial), (10, 1_700_000_000));

        // Clock behind the serial: one step forward.
        let resp = coord.on_command(&CommandRequest::new(Command::Bump, "RPZ.Example"), 5);
        assert_eq!(resp.new_serial, 1_700_000_001);
        assert_eq!(coord.reader().serial(), 1_700_000_001);
        assert!(coord.zone.chain().diffs_from(10).is_some());
    }

    #[test]
    fn test_add_and_remove_greylist_name() {
        let mut coord = coordinator(Arc::default());
        let resp = coord.on_command(
            &add("Manual.Example", ListType::Greylist, "manual").with_policy(PolicyAction::Drop),
            100,
        );
        assert!(!resp.error, "{}", resp.error_message);
        assert_eq!((resp.old_serial, resp.new_serial), (10, 11));
        let entry = coord.reader().snapshot().lookup("manual.example.").cloned().unwrap();
        assert_eq!(entry.action, PolicyAction::Nxdomain);

        let remove = CommandRequest::new(Command::RpzRemove, ZONE)
            .with_domain("manual.example.")
            .with_source(ListType::Greylist, "manual");
        let resp = coord.on_command(&remove, 101);
        assert_eq!(resp.new_serial, 12);
        assert!(coord.reader().snapshot().lookup("manual.example.").is_none());

        // Second removal is a no-op.
        let resp = coord.on_command(&remove, 102);
        assert!(!resp.error);
        assert_eq!(resp.new_serial, 12);
        assert!(resp.message.contains("not in"));
    }

    #[test]
    fn test_unknown_zone_or_source_is_an_error() {
        let mut coord = coordinator(Arc::default());
        let mut req = add("x.example.", ListType::Greylist, "manual");
        req.zone = "other.example.".into();
        let resp = coord.on_command(&req, 0);
        assert!(resp.error);
        assert!(resp.error_message.contains("unknown zone"));

        let resp = coord.on_command(&add("x.example.", ListType::Greylist, "nosuch"), 0);
        assert!(resp.error);
        assert_eq!(resp.new_serial, 10);

        let resp = coord.on_command(&CommandRequest::new(Command::RpzLookup, ZONE), 0);
        assert!(resp.error);
        assert!(resp.error_message.contains("domain"));
    }

    #[test]
    fn test_add_and_remove_refuse_other_categories() {
        let mut coord = coordinator(Arc::default());
        let resp = coord.on_command(&add("x.example.", ListType::Blacklist, "local"), 0);
        assert!(resp.error);
        assert!(resp.error_message.contains("not a greylist"));
        assert_eq!(resp.new_serial, 10);

        let remove = CommandRequest::new(Command::RpzRemove, ZONE)
            .with_domain("x.example.")
            .with_source(ListType::Whitelist, "allow");
        assert!(coord.on_command(&remove, 0).error);
        assert!(!coord.registry().in_category(ListType::Blacklist, "x.example."));
    }

    #[test]
    fn test_lookup_reports_lists_and_actions() {
        let mut coord = coordinator(Arc::default());
        coord.on_command(
            &add("seen.example.", ListType::Greylist, "tapir").with_policy(PolicyAction::Nodata),
            0,
        );
        coord.on_batch(
            &IntelBatch {
                source: "allow".into(),
                list_type: Some(ListType::Whitelist),
                added: vec![IntelAddition {
                    name: "seen.example.".into(),
                    ..IntelAddition::default()
                }],
                removed: vec![],
            },
            0,
        );

        let resp = coord.on_command(
            &CommandRequest::new(Command::RpzLookup, ZONE).with_domain("seen.example"),
            0,
        );
        assert!(!resp.error, "{}", resp.error_message);
        let report: serde_json::Value = serde_json::from_str(&resp.message).unwrap();
        assert_eq!(report["name"], "seen.example.");
        assert_eq!(
            report["lists"],
            serde_json::json!(["whitelist/allow", "greylist/tapir"])
        );
        assert_eq!(report["asserted"], serde_json::json!(["NODATA"]));
        assert_eq!(report["action"], "WHITELIST");
        assert_eq!(report["published"], serde_json::Value::Null);
    }

    #[test]
    fn test_list_sources() {
        let mut coord = coordinator(Arc::default());
        let resp = coord.on_command(&CommandRequest::new(Command::RpzListSources, ZONE), 0);
        assert!(!resp.error);
        let lists: Vec<serde_json::Value> = serde_json::from_str(&resp.message).unwrap();
        assert_eq!(lists.len(), 4);
        assert!(lists.iter().any(|l| l["name"] == "tapir"));
    }
}
