//! Output zone identity and record construction.
//!
//! Policy triggers live under the zone origin: the trigger `evil.example.`
//! in zone `rpz.local.` is the owner `evil.example.rpz.local.`, and its CNAME
//! target encodes the action.

use hickory_proto::rr::rdata::{CNAME, NS, SOA};
use hickory_proto::rr::{Name, RData, Record};
use rpz_core::PolicyAction;

use crate::config::ZoneConfig;
use crate::zone::ttl_policy;
use crate::SrvError;

/// Origin, SOA contact and nameservers of the synthesized zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneApex {
    origin: Name,
    /// Lower-case ASCII origin with trailing dot.
    origin_text: String,
    mname: Name,
    rname: Name,
    nameservers: Vec<Name>,
    ttl: u32,
}

fn parse_name(field: &str, value: &str) -> crate::Result<Name> {
    Name::parse(value, None)
        .map(|n| n.to_lowercase())
        .map_err(|e| SrvError::Zone(format!("invalid {field} {value:?}: {e}")))
}

impl ZoneApex {
    pub fn new(
        origin: &str,
        mname: &str,
        rname: &str,
        nameservers: &[String],
        ttl: u32,
    ) -> crate::Result<Self> {
        let mut origin = parse_name("zone name", origin)?;
        origin.set_fqdn(true);
        let mname = parse_name("SOA mname", mname)?;
        let rname = parse_name("SOA rname", rname)?;
        let nameservers = if nameservers.is_empty() {
            vec![mname.clone()]
        } else {
            nameservers
                .iter()
                .map(|ns| parse_name("nameserver", ns))
                .collect::<crate::Result<_>>()?
        };
        Ok(Self {
            origin_text: origin.to_ascii(),
            origin,
            mname,
            rname,
            nameservers,
            ttl,
        })
    }

    pub fn from_config(config: &ZoneConfig) -> crate::Result<Self> {
        Self::new(
            &config.name,
            &config.mname,
            &config.rname,
            &config.nameservers,
            config.ttl,
        )
    }

    pub const fn origin(&self) -> &Name {
        &self.origin
    }

    pub fn origin_text(&self) -> &str {
        &self.origin_text
    }

    pub const fn ttl(&self) -> u32 {
        self.ttl
    }

    /// True if `zone` names this zone (case and trailing dot ignored).
    pub fn is_zone(&self, zone: &str) -> bool {
        let zone = zone.trim().trim_end_matches('.');
        self.origin_text
            .trim_end_matches('.')
            .eq_ignore_ascii_case(zone)
    }

    /// True if `name` is the apex or below it.
    pub fn contains(&self, name: &Name) -> bool {
        self.origin.zone_of(name)
    }

    pub fn soa_record(&self, serial: u32) -> Record {
        let soa = SOA::new(
            self.mname.clone(),
            self.rname.clone(),
            serial,
            ttl_policy::SOA_REFRESH,
            ttl_policy::SOA_RETRY,
            ttl_policy::SOA_EXPIRE,
            ttl_policy::SOA_MINIMUM_TTL,
        );
        Record::from_rdata(self.origin.clone(), self.ttl, RData::SOA(soa))
    }

    pub fn ns_records(&self) -> Vec<Record> {
        self.nameservers
            .iter()
            .map(|ns| {
                Record::from_rdata(
                    self.origin.clone(),
                    ttl_policy::NS_TTL,
                    RData::NS(NS(ns.clone())),
                )
            })
            .collect()
    }

    /// Owner key for a trigger: the trigger name followed by the origin.
    pub fn owner_key(&self, trigger: &str) -> String {
        format!("{trigger}{}", self.origin_text)
    }

    /// Trigger name of an owner inside this zone, if it is below the apex.
    pub fn trigger_of(&self, owner: &Name) -> Option<String> {
        let text = owner.to_lowercase().to_ascii();
        let trigger = text.strip_suffix(&self.origin_text)?;
        if trigger.is_empty() || !trigger.ends_with('.') {
            return None;
        }
        Some(trigger.to_string())
    }

    /// The CNAME record encoding `action` for `trigger`, or `None` for
    /// actions that are never emitted.
    pub fn policy_record(&self, trigger: &str, action: PolicyAction) -> crate::Result<Option<Record>> {
        if !action.is_blocking() {
            return Ok(None);
        }
        let Some(target) = action.rpz_target() else {
            return Ok(None);
        };
        let owner = Name::from_ascii(self.owner_key(trigger))
            .map_err(|e| SrvError::Zone(format!("cannot place {trigger} in zone: {e}")))?;
        let target = Name::from_ascii(target)
            .map_err(|e| SrvError::Zone(format!("invalid policy target {target}: {e}")))?;
        Ok(Some(Record::from_rdata(
            owner,
            self.ttl,
            RData::CNAME(CNAME(target)),
        )))
    }
}
