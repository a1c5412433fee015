//! Upstream zones: pulling external authorities and reading their contents.

pub mod client;

pub use client::XfrClient;

use async_trait::async_trait;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use rpz_core::{PolicyAction, TaggedName};
use std::collections::BTreeMap;
use std::net::SocketAddr;

use crate::config::UpstreamFormat;
use crate::sources::canonical_name;

/// Pulls zones from an external authority.
#[async_trait]
pub trait ZoneFetcher: Send + Sync {
    /// Current SOA serial of `zone` at `upstream`.
    async fn soa_serial(&self, zone: &Name, upstream: SocketAddr) -> crate::Result<u32>;

    /// Full transfer of `zone` from `upstream`.
    async fn transfer(&self, zone: &Name, upstream: SocketAddr) -> crate::Result<UpstreamZone>;
}

/// A zone received by AXFR.
#[derive(Debug, Clone, Default)]
pub struct UpstreamZone {
    pub origin: Name,
    pub serial: u32,
    pub soa: Option<Record>,
    pub ns: Vec<Record>,
    /// Owner name -> records at that owner, apex excluded.
    pub rrsets: BTreeMap<Name, Vec<Record>>,
}

impl UpstreamZone {
    /// Index transfer records. The first SOA sets the serial; duplicate
    /// SOAs (the closing one) are dropped.
    pub fn from_records(origin: Name, records: impl IntoIterator<Item = Record>) -> Self {
        let mut zone = Self {
            origin,
            ..Self::default()
        };
        for record in records {
            let at_apex = record.name() == &zone.origin;
            let soa_serial = match record.data() {
                RData::SOA(soa) => Some(soa.serial()),
                _ => None,
            };
            match (at_apex, soa_serial, record.record_type()) {
                (true, Some(serial), _) => {
                    if zone.soa.is_none() {
                        zone.serial = serial;
                        zone.soa = Some(record);
                    }
                }
                (true, None, RecordType::NS) => zone.ns.push(record),
                _ => zone
                    .rrsets
                    .entry(record.name().to_lowercase())
                    .or_default()
                    .push(record),
            }
        }
        zone
    }

    pub fn len(&self) -> usize {
        self.rrsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rrsets.is_empty()
    }

    /// Names below the apex, relative to it, as canonical trigger names.
    fn triggers(&self) -> impl Iterator<Item = (String, &[Record])> {
        let origin = self.origin.to_lowercase().to_ascii();
        self.rrsets.iter().filter_map(move |(owner, records)| {
            let text = owner.to_ascii();
            let relative = text.strip_suffix(origin.as_str())?;
            let trigger = canonical_name(relative)?;
            Some((trigger, records.as_slice()))
        })
    }
}

/// Turns a pulled zone into list entries.
pub type ZoneParser = fn(&UpstreamZone, &str, i64) -> Vec<TaggedName>;

/// Parser for a list's upstream format.
pub fn parser_for(format: UpstreamFormat) -> ZoneParser {
    match format {
        UpstreamFormat::Rpz => parse_rpz_zone,
        UpstreamFormat::Domains => parse_domain_zone,
    }
}

/// RPZ zone: a CNAME at each trigger encodes the action.
///
/// Triggers without a CNAME or with a local-data target are listed with an
/// unknown action; the list's category still decides how they are treated.
pub fn parse_rpz_zone(zone: &UpstreamZone, source: &str, now: i64) -> Vec<TaggedName> {
    zone.triggers()
        .map(|(trigger, records)| {
            let action = records
                .iter()
                .find_map(|r| match r.data() {
                    RData::CNAME(target) => Some(PolicyAction::from_rpz_target(&target.0.to_ascii())),
                    _ => None,
                })
                .unwrap_or_default();
            TaggedName {
                action,
                added_at: now,
                ..TaggedName::bare(trigger, source)
            }
        })
        .collect()
}

/// Plain zone: every owner below the apex that holds an address or CNAME.
pub fn parse_domain_zone(zone: &UpstreamZone, source: &str, now: i64) -> Vec<TaggedName> {
    zone.triggers()
        .filter(|(_, records)| {
            records.iter().any(|r| {
                matches!(
                    r.record_type(),
                    RecordType::A | RecordType::AAAA | RecordType::CNAME
                )
            })
        })
        .map(|(trigger, _)| TaggedName {
            added_at: now,
            ..TaggedName::bare(trigger, source)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::rdata::{A, CNAME, NS, SOA};

    fn name(s: &str) -> Name {
        Name::from_ascii(s).unwrap()
    }

    fn upstream_records() -> Vec<Record> {
        let origin = name("rpz.upstream.");
        let soa = Record::from_rdata(
            origin.clone(),
            60,
            RData::SOA(SOA::new(name("ns."), name("admin."), 99, 1, 1, 1, 1)),
        );
        vec![
            soa.clone(),
            Record::from_rdata(origin.clone(), 60, RData::NS(NS(name("ns.upstream.")))),
            Record::from_rdata(
                name("Bad.Example.rpz.upstream."),
                60,
                RData::CNAME(CNAME(name("."))),
            ),
            Record::from_rdata(
                name("drop.example.rpz.upstream."),
                60,
                RData::CNAME(CNAME(name("rpz-drop."))),
            ),
            Record::from_rdata(
                name("host.example.rpz.upstream."),
                60,
                RData::A(A::new(192, 0, 2, 1)),
            ),
            soa,
        ]
    }

    #[test]
    fn test_from_records_indexes_zone() {
        let zone = UpstreamZone::from_records(name("rpz.upstream."), upstream_records());
        assert_eq!(zone.serial, 99);
        assert!(zone.soa.is_some());
        assert_eq!(zone.ns.len(), 1);
        assert_eq!(zone.len(), 3);
    }

    #[test]
    fn test_parse_rpz_zone() {
        let zone = UpstreamZone::from_records(name("rpz.upstream."), upstream_records());
        let mut names = parse_rpz_zone(&zone, "up", 5);
        names.sort_by(|a, b| a.name.cmp(&b.name));
        let got: Vec<(&str, PolicyAction)> =
            names.iter().map(|n| (n.name.as_str(), n.action)).collect();
        assert_eq!(
            got,
            vec![
                ("bad.example.", PolicyAction::Nxdomain),
                ("drop.example.", PolicyAction::Drop),
                ("host.example.", PolicyAction::Unknown),
            ]
        );
        assert!(names.iter().all(|n| n.source == "up" && n.added_at == 5));
    }

    #[test]
    fn test_parse_domain_zone() {
        let zone = UpstreamZone::from_records(name("rpz.upstream."), upstream_records());
        let names = parse_domain_zone(&zone, "up", 0);
        assert_eq!(names.len(), 3);
        assert_eq!(parser_for(UpstreamFormat::Domains)(&zone, "up", 0).len(), 3);
    }
}
