//! Refresh bookkeeping for one upstream zone.

use hickory_proto::rr::Name;
use rpz_core::ListType;
use std::net::SocketAddr;

use crate::config::{DataSource, ListConfig};
use crate::upstream::{parser_for, ZoneParser};
use crate::SrvError;

/// RFC 1982 serial comparison: true if `a` is newer than `b`.
pub const fn serial_newer(a: u32, b: u32) -> bool {
    a != b && a.wrapping_sub(b) < 0x8000_0000
}

/// One `datasource = "xfr"` list and where its refresh countdown stands.
#[derive(Debug, Clone)]
pub struct UpstreamTracker {
    pub list_type: ListType,
    pub source: String,
    pub zone: Name,
    pub upstream: SocketAddr,
    /// Seconds between SOA checks.
    pub interval: u64,
    /// Seconds until the next SOA check.
    pub countdown: u64,
    /// Serial of the last successful transfer.
    pub serial: Option<u32>,
    pub parser: ZoneParser,
}

impl UpstreamTracker {
    /// Tracker for an xfr list. The first check happens on the first tick.
    pub fn from_config(list: &ListConfig, max_refresh: u64) -> crate::Result<Self> {
        if list.datasource != DataSource::Xfr {
            return Err(SrvError::Config(format!("list {} is not an xfr list", list.name)));
        }
        let (Some(zone), Some(upstream)) = (&list.zone, list.upstream) else {
            return Err(SrvError::Config(format!(
                "list {}: xfr datasource needs zone and upstream",
                list.name
            )));
        };
        let zone = Name::from_ascii(zone)
            .map_err(|e| SrvError::Config(format!("list {}: zone {zone:?}: {e}", list.name)))?;
        let zone = zone_key(&zone);
        Ok(Self {
            list_type: list.list_type,
            source: list.name.clone(),
            zone,
            upstream,
            interval: list.refresh_secs.clamp(1, max_refresh.max(1)),
            countdown: 1,
            serial: None,
            parser: parser_for(list.zone_format),
        })
    }

    /// Advance one second. True when a check is due.
    pub fn tick(&mut self) -> bool {
        self.countdown = self.countdown.saturating_sub(1);
        self.countdown == 0
    }

    pub fn reset(&mut self) {
        self.countdown = self.interval;
    }

    /// True if an upstream at `upstream_serial` has something we have not pulled.
    pub const fn needs_transfer(&self, upstream_serial: u32) -> bool {
        match self.serial {
            None => true,
            Some(have) => serial_newer(upstream_serial, have),
        }
    }

    pub fn matches(&self, zone: &Name) -> bool {
        self.zone == zone_key(zone)
    }
}

/// Lowercase, fully qualified form used to compare zone names.
pub(crate) fn zone_key(zone: &Name) -> Name {
    let mut key = zone.to_lowercase();
    key.set_fqdn(true);
    key
}
