pub mod defs;

pub use defs::{AuditFetch, AuditRecord, AuditTrail, Operation, TimeWindow};
