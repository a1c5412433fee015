//! AXFR/IXFR response assembly.
//!
//! Pure functions from a published snapshot and diff chain to record
//! sequences and wire envelopes; the server only streams what these return.

use hickory_proto::rr::Record;
use std::sync::Arc;

use crate::zone::ttl_policy::MAX_RECORDS_PER_ENVELOPE;
use crate::zone::{DiffChain, IncrementalDiff, ZoneSnapshot};

/// How to answer an IXFR for a client at some serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IxfrPlan {
    /// Client already has the current serial: a single SOA.
    UpToDate,
    /// Diffs from the client's serial to the current one.
    Incremental(Vec<Arc<IncrementalDiff>>),
    /// No retained diff starts at the client's serial.
    Full,
}

pub fn ixfr_plan(snapshot: &ZoneSnapshot, chain: &DiffChain, client_serial: u32) -> IxfrPlan {
    if client_serial == snapshot.serial() {
        return IxfrPlan::UpToDate;
    }
    match chain.diffs_from(client_serial) {
        Some(diffs) if !diffs.is_empty() => IxfrPlan::Incremental(diffs),
        _ => IxfrPlan::Full,
    }
}

/// SOA, NS set, every policy record, SOA.
pub fn axfr_records(snapshot: &ZoneSnapshot) -> Vec<Record> {
    let soa = snapshot.soa();
    let mut records = Vec::with_capacity(snapshot.len() + 4);
    records.push(soa.clone());
    records.extend(snapshot.ns());
    records.extend(snapshot.entries().map(|e| e.record.clone()));
    records.push(soa);
    records
}

/// Incremental transfer body (RFC 1995 section 4).
pub fn ixfr_records(snapshot: &ZoneSnapshot, diffs: &[Arc<IncrementalDiff>]) -> Vec<Record> {
    let apex = snapshot.apex();
    let current = snapshot.soa();
    let body: usize = diffs.iter().map(|d| d.len() + 2).sum();
    let mut records = Vec::with_capacity(body + 2);
    records.push(current.clone());
    for diff in diffs {
        records.push(apex.soa_record(diff.from_serial));
        records.extend(diff.removed.iter().map(|e| e.record.clone()));
        records.push(apex.soa_record(diff.to_serial));
        records.extend(diff.added.iter().map(|e| e.record.clone()));
    }
    records.push(current);
    records
}

/// Split a transfer into messages of at most 500 records.
pub fn envelopes(records: Vec<Record>) -> Vec<Vec<Record>> {
    let mut out = Vec::with_capacity(records.len().div_ceil(MAX_RECORDS_PER_ENVELOPE));
    let mut iter = records.into_iter().peekable();
    while iter.peek().is_some() {
        out.push(iter.by_ref().take(MAX_RECORDS_PER_ENVELOPE).collect());
    }
    out
}
