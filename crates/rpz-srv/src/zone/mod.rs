//! The synthesized output zone: identity, snapshots, history, synthesis.

pub mod apex;
pub mod chain;
pub mod snapshot;
pub mod synth;
pub mod ttl_policy;

pub use apex::ZoneApex;
pub use chain::DiffChain;
pub use snapshot::{IncrementalDiff, PolicyEntry, ZoneSnapshot};
pub use synth::{RpzSynthesizer, ZoneState};
