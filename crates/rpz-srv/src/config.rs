//! Server configuration for rpzd.

use rpz_core::{ListType, PolicyAction, SourceFormat, TagMask};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::policy::PolicySettings;
use crate::SrvError;

/// Configuration for an rpzd policy zone server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// UDP/TCP listen address (default: 0.0.0.0:5353).
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Output zone identity.
    #[serde(default)]
    pub zone: ZoneConfig,

    /// How source membership turns into policy actions.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Source lists.
    #[serde(default)]
    pub lists: Vec<ListConfig>,

    /// Resolvers to NOTIFY after every content change.
    #[serde(default)]
    pub downstreams: Vec<SocketAddr>,

    /// Width of a reaper time bucket (seconds).
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,

    /// Upper bound for any upstream refresh interval (seconds).
    #[serde(default = "default_max_refresh")]
    pub max_refresh_secs: u64,

    /// Time allowed for one upstream SOA query or transfer (seconds).
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,

    /// Number of incremental diffs kept for IXFR.
    #[serde(default = "default_max_diff_chain")]
    pub max_diff_chain: usize,

    /// Path to the serial state file (default: platform data dir).
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

/// The synthesized output zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Zone origin (default: rpz.local.).
    #[serde(default = "default_zone_name")]
    pub name: String,

    /// SOA primary nameserver.
    #[serde(default = "default_mname")]
    pub mname: String,

    /// SOA responsible mailbox, in domain form.
    #[serde(default = "default_rname")]
    pub rname: String,

    /// Apex NS records; defaults to the SOA mname.
    #[serde(default)]
    pub nameservers: Vec<String>,

    /// TTL of every record in the zone.
    #[serde(default = "default_zone_ttl")]
    pub ttl: u32,
}

/// Policy thresholds and actions.
///
/// Actions are kept as strings here and parsed by [`ServerConfig::policy_settings`]
/// so a typo is reported with the offending value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Action for names on any blacklist.
    #[serde(default = "default_block_action")]
    pub blacklist_action: String,

    /// Greylist sources needed before `num_sources_action` applies.
    #[serde(default = "default_num_sources")]
    pub num_sources: usize,

    #[serde(default = "default_block_action")]
    pub num_sources_action: String,

    /// Tag count on the primary source that must be exceeded.
    #[serde(default = "default_num_tags")]
    pub num_tags: u32,

    #[serde(default = "default_block_action")]
    pub num_tags_action: String,

    /// Tags on the primary source that block outright. Empty disables.
    #[serde(default)]
    pub black_tags: Vec<String>,

    #[serde(default = "default_block_action")]
    pub black_tags_action: String,

    /// Greylist source whose tags drive the tag rules (usually the intel feed).
    #[serde(default)]
    pub primary_source: Option<String>,
}

/// Where a list's names come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Loaded once from `path`.
    File,
    /// Filled by intel-feed batches and control commands.
    #[default]
    Feed,
    /// Pulled by zone transfer from `upstream`.
    Xfr,
}

/// How an upstream zone is turned into names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamFormat {
    /// RPZ zone: owner names are policy triggers, CNAME targets are actions.
    #[default]
    Rpz,
    /// Plain zone: every owner name below the apex is listed.
    Domains,
}

/// One source list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub list_type: ListType,

    #[serde(default)]
    pub format: SourceFormat,

    #[serde(default)]
    pub datasource: DataSource,

    #[serde(default)]
    pub description: String,

    /// Text, CSV or fst file for `datasource = "file"`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Zone to transfer for `datasource = "xfr"`.
    #[serde(default)]
    pub zone: Option<String>,

    /// Authority to transfer from.
    #[serde(default)]
    pub upstream: Option<SocketAddr>,

    #[serde(default)]
    pub zone_format: UpstreamFormat,

    /// Seconds between upstream SOA checks.
    #[serde(default = "default_refresh")]
    pub refresh_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            zone: ZoneConfig::default(),
            policy: PolicyConfig::default(),
            lists: Vec::new(),
            downstreams: Vec::new(),
            reaper_interval_secs: default_reaper_interval(),
            max_refresh_secs: default_max_refresh(),
            upstream_timeout_secs: default_upstream_timeout(),
            max_diff_chain: default_max_diff_chain(),
            state_path: None,
        }
    }
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            name: default_zone_name(),
            mname: default_mname(),
            rname: default_rname(),
            nameservers: Vec::new(),
            ttl: default_zone_ttl(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            blacklist_action: default_block_action(),
            num_sources: default_num_sources(),
            num_sources_action: default_block_action(),
            num_tags: default_num_tags(),
            num_tags_action: default_block_action(),
            black_tags: Vec::new(),
            black_tags_action: default_block_action(),
            primary_source: None,
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| SrvError::Config(e.to_string()))
        } else {
            Ok(Self::default())
        }
    }

    /// Parse the policy section into typed settings.
    pub fn policy_settings(&self) -> crate::Result<PolicySettings> {
        let p = &self.policy;
        Ok(PolicySettings {
            blacklist_action: parse_action("blacklist_action", &p.blacklist_action)?,
            num_sources: p.num_sources,
            num_sources_action: parse_action("num_sources_action", &p.num_sources_action)?,
            num_tags: p.num_tags,
            num_tags_action: parse_action("num_tags_action", &p.num_tags_action)?,
            black_tags: TagMask::from_names(&p.black_tags)
                .map_err(|e| SrvError::Config(format!("black_tags: {e}")))?,
            black_tags_action: parse_action("black_tags_action", &p.black_tags_action)?,
            primary_source: p.primary_source.clone(),
        })
    }

    /// State file path: configured, or `<data dir>/rpzd/serial.json`.
    pub fn state_file(&self) -> Option<PathBuf> {
        self.state_path.clone().or_else(crate::state::default_state_path)
    }

    /// Check the configuration for errors that would only show up at runtime.
    pub fn validate(&self) -> crate::Result<()> {
        hickory_proto::rr::Name::from_ascii(&self.zone.name)
            .map_err(|e| SrvError::Config(format!("zone name {:?}: {e}", self.zone.name)))?;
        if self.reaper_interval_secs == 0 {
            return Err(SrvError::Config("reaper_interval_secs must be > 0".into()));
        }
        if self.max_refresh_secs == 0 {
            return Err(SrvError::Config("max_refresh_secs must be > 0".into()));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(SrvError::Config("upstream_timeout_secs must be > 0".into()));
        }
        if self.max_diff_chain == 0 {
            return Err(SrvError::Config("max_diff_chain must be > 0".into()));
        }
        if self.policy.num_sources == 0 {
            return Err(SrvError::Config("policy.num_sources must be > 0".into()));
        }
        self.policy_settings()?;

        let mut seen = HashSet::new();
        for list in &self.lists {
            if list.name.trim().is_empty() {
                return Err(SrvError::Config("list with empty name".into()));
            }
            if !seen.insert((list.list_type, list.name.as_str())) {
                return Err(SrvError::Config(format!(
                    "duplicate list {}/{}",
                    list.list_type, list.name
                )));
            }
            list.validate()?;
        }

        if let Some(primary) = &self.policy.primary_source {
            let found = self
                .lists
                .iter()
                .any(|l| l.list_type == ListType::Greylist && &l.name == primary);
            if !found {
                return Err(SrvError::Config(format!(
                    "primary_source {primary:?} is not a configured greylist"
                )));
            }
        }
        Ok(())
    }
}

impl ListConfig {
    fn validate(&self) -> crate::Result<()> {
        let err = |msg: &str| Err(SrvError::Config(format!("list {}: {msg}", self.name)));
        match self.datasource {
            DataSource::File if self.path.is_none() => err("file datasource needs a path"),
            DataSource::Xfr if self.zone.is_none() || self.upstream.is_none() => {
                err("xfr datasource needs zone and upstream")
            }
            DataSource::Xfr if self.refresh_secs == 0 => err("refresh_secs must be > 0"),
            DataSource::Feed | DataSource::Xfr if self.format == SourceFormat::Dawg => {
                err("dawg lists can only be loaded from a file")
            }
            _ => Ok(()),
        }
    }
}

fn parse_action(field: &str, value: &str) -> crate::Result<PolicyAction> {
    value
        .parse()
        .map_err(|e| SrvError::Config(format!("policy.{field}: {e}")))
}

// Default value functions for serde.
const fn default_listen() -> SocketAddr {
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 5353)
}

const fn default_reaper_interval() -> u64 {
    60
}

const fn default_max_refresh() -> u64 {
    86400
}

const fn default_upstream_timeout() -> u64 {
    10
}

const fn default_max_diff_chain() -> usize {
    1000
}

const fn default_refresh() -> u64 {
    300
}

const fn default_num_sources() -> usize {
    2
}

const fn default_num_tags() -> u32 {
    2
}

const fn default_zone_ttl() -> u32 {
    crate::zone::ttl_policy::POLICY_TTL
}

fn default_zone_name() -> String {
    String::from("rpz.local.")
}

fn default_mname() -> String {
    String::from("ns1.rpz.local.")
}

fn default_rname() -> String {
    String::from("hostmaster.rpz.local.")
}

fn default_block_action() -> String {
    String::from("NXDOMAIN")
}
