//! TTL and SOA timer constants for the output zone.
//!
//! Policy records default to a short TTL so a delisted name stops being
//! blocked quickly once resolvers refresh the zone.

/// TTL for apex NS records.
pub const NS_TTL: u32 = 86400;

/// Default TTL for policy CNAME records.
pub const POLICY_TTL: u32 = 60;

/// SOA minimum TTL (negative caching).
pub const SOA_MINIMUM_TTL: u32 = 60;

/// SOA refresh interval (Hickory uses i32 for SOA fields).
/// Secondaries normally hear about changes by NOTIFY long before this.
pub const SOA_REFRESH: i32 = 3600;

/// SOA retry interval.
pub const SOA_RETRY: i32 = 600;

/// SOA expire interval.
pub const SOA_EXPIRE: i32 = 604_800;

/// Maximum records per AXFR/IXFR message.
pub const MAX_RECORDS_PER_ENVELOPE: usize = 500;

