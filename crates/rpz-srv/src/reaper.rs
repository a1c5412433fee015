//! Greylist eviction in fixed time buckets.
//!
//! An entry added with a TTL is parked in the first bucket boundary at or
//! after its expiry. Each sweep evicts one bucket, plus any older bucket a
//! previous sweep missed.

use rpz_core::TaggedName;
use std::time::Duration;
use tracing::{debug, info};

use crate::sources::SourceRegistry;

/// Largest bucket boundary at or before `t`.
pub const fn bucket_floor(t: i64, interval: i64) -> i64 {
    t - t.rem_euclid(interval)
}

/// Smallest bucket boundary at or after `t`.
pub const fn bucket_ceil(t: i64, interval: i64) -> i64 {
    let floor = bucket_floor(t, interval);
    if floor == t {
        t
    } else {
        floor + interval
    }
}

/// Time from `now` until the next bucket boundary. Never zero.
pub fn until_next_boundary(now: i64, interval: i64) -> Duration {
    let wait = interval - now.rem_euclid(interval);
    Duration::from_secs(u64::try_from(wait).unwrap_or(1))
}

/// Sweeps greylist expiry buckets.
#[derive(Debug, Clone, Copy)]
pub struct ReaperScheduler {
    interval: i64,
}

impl ReaperScheduler {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval: i64::try_from(interval_secs.max(1)).unwrap_or(i64::MAX),
        }
    }

    pub const fn interval(&self) -> i64 {
        self.interval
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.interval.unsigned_abs())
    }

    /// Evict every greylist entry due at `now`, returning the removals.
    pub fn sweep(&self, registry: &mut SourceRegistry, now: i64) -> Vec<TaggedName> {
        let bucket = bucket_floor(now, self.interval);
        let reaped = registry.sweep(bucket);
        if reaped.is_empty() {
            debug!(bucket, "reaper sweep: nothing due");
        } else {
            info!(bucket, reaped = reaped.len(), "reaper evicted expired greylist names");
        }
        reaped
    }
}
