//! Selects the audit records that arrived since the previous poll.
//!
//! This is a high-water mark, not an id diff: a record is new only if it is
//! strictly later than everything in the previous result set. Records that
//! fall into a gap between two queries (pagination, retention) are never
//! reported, and a skewed remote clock produces false positives or negatives.

use crate::types::AuditRecord;

/// Latest timestamp in a record set.
pub fn latest_time_stamp(records: &[AuditRecord]) -> Option<i64> {
    records.iter().map(|r| r.time_stamp).max()
}

/// Records in `current` that are newer than everything in `previous`.
///
/// With no previous set every current record counts as new; the orchestrator
/// is responsible for not alerting on those. An empty previous set has no
/// high-water mark, so nothing in `current` can be later than it and the
/// result is empty. Relative order of `current` is kept.
pub fn filter_new(previous: Option<&[AuditRecord]>, current: &[AuditRecord]) -> Vec<AuditRecord> {
    let Some(previous) = previous else {
        return current.to_vec();
    };
    let Some(latest_prior) = latest_time_stamp(previous) else {
        return Vec::new();
    };
    current
        .iter()
        .filter(|r| r.time_stamp > latest_prior)
        .cloned()
        .collect()
}
