//! rpz-srv: Response Policy Zone aggregation server.
//!
//! Merges many threat-intelligence name lists into one RPZ zone and serves
//! it to recursive resolvers over AXFR/IXFR, sending NOTIFY on every change.
//!
//! # Architecture
//!
//! - [`sources`]: whitelists, blacklists and greylists, as hash maps
//!   (mutable) or compressed tries (read-only)
//! - [`policy`]: turns list membership into one action per name
//! - [`zone`]: synthesizes the zone, its serials and the IXFR diff chain
//! - [`reaper`]: evicts greylist names whose TTL ran out
//! - [`coordinator`]: the single task that owns and mutates all of the above
//! - [`server`] / [`xfr`]: queries and zone transfers from published snapshots
//! - [`upstream`]: pulls external RPZ zones; [`notify`] pushes to secondaries
//!
//! # Policy encoding
//!
//! Each blocked name `evil.example.` becomes a CNAME at
//! `evil.example.<zone>`; the target names the action (`.` NXDOMAIN,
//! `*.` NODATA, `rpz-drop.` DROP).

pub mod config;
pub mod coordinator;
pub mod error;
pub mod notify;
pub mod policy;
pub mod reaper;
pub mod server;
pub mod sources;
pub mod state;
pub mod upstream;
pub mod xfr;
pub mod zone;

// Re-exports for convenience.
pub use config::ServerConfig;
pub use coordinator::{Coordinator, CoordinatorHandle, ZoneReader};
pub use error::SrvError;
pub use policy::{PolicyEngine, PolicySettings};
pub use sources::SourceRegistry;
pub use zone::{RpzSynthesizer, ZoneSnapshot};

/// Result type for rpz-srv operations.
pub type Result<T> = std::result::Result<T, SrvError>;
