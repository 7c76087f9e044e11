use std::fmt;

use serde::{Deserialize, Serialize};

/// Administrative verb recorded by the management audit trail.
///
/// The remote side reports `CREATE`, `UPDATE` and `DELETE`; anything else is
/// kept verbatim so it can still be logged, but no rule will ever match it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Other(String),
}

impl Operation {
    pub fn as_str(&self) -> &str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Other(verb) => verb,
        }
    }
}

impl From<String> for Operation {
    fn from(verb: String) -> Self {
        match verb.as_str() {
            "CREATE" => Operation::Create,
            "UPDATE" => Operation::Update,
            "DELETE" => Operation::Delete,
            _ => Operation::Other(verb),
        }
    }
}

impl From<&str> for Operation {
    fn from(verb: &str) -> Self {
        Operation::from(verb.to_owned())
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        op.as_str().to_owned()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One administrative API call as reported by the audit trail, e.g.
///
/// ```json
/// {
///   "operation" : "DELETE",
///   "requestUri" : "/v1/organizations/cap250/apis/jn_Open_Weather",
///   "responseCode" : "200",
///   "timeStamp" : 1449105541324,
///   "user" : "DChiesa@apigee.com"
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub operation: Operation,
    pub request_uri: String,
    pub response_code: String,
    /// Epoch milliseconds.
    pub time_stamp: i64,
    #[serde(default)]
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
}

/// Body of a successful audit query.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTrail {
    #[serde(default)]
    pub audit_record: Vec<AuditRecord>,
}

/// Outcome of one audit query.
///
/// `records` is `None` whenever the query did not produce a usable body,
/// including a 200 whose body could not be parsed.
#[derive(Clone, Debug, Default)]
pub struct AuditFetch {
    pub status: u16,
    pub records: Option<Vec<AuditRecord>>,
}

impl AuditFetch {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Closed interval of epoch milliseconds to query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeWindow {
    /// Window of `lookback_ms` ending at `end_ms`.
    pub fn ending_at(end_ms: i64, lookback_ms: i64) -> Self {
        Self {
            start_ms: end_ms - lookback_ms,
            end_ms,
        }
    }
}

// Object style note:
// These are plain data carriers shared between the watcher and anything that
// feeds it in tests. They hold no connections and do no I/O;
// everything that talks to the network lives in the watcher crate.
