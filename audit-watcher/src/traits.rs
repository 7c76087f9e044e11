use crate::types::{AuditFetch, Result, TimeWindow};
use async_trait::async_trait;

/// Source of audit records (the management API's audit trail).
#[async_trait]
pub trait AuditSource: Send + Sync {
    /// Query the audit trail for the given window.
    ///
    /// A non-200 status is reported through [`AuditFetch::status`], not as an
    /// error; errors are transport problems or authentication failures.
    async fn fetch_audits(&self, window: TimeWindow) -> Result<AuditFetch>;
}

/// Looks up human-readable names that are not present in the audit record.
#[async_trait]
pub trait DetailLookup: Send + Sync {
    /// Display name of a saved analytics report, if the API knows one.
    async fn report_display_name(&self, report_id: &str) -> Result<Option<String>>;
}

/// Delivers a formatted message to the alert destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Best effort; the caller only logs and counts the outcome.
    async fn notify(&self, payload: &serde_json::Value) -> Result<()>;
}
