// Use the interfaces crate for the shared data model
pub use interfaces::defs::{AuditFetch, AuditRecord, AuditTrail, Operation, TimeWindow};

/// Settings shared by every outbound HTTP call the watcher makes.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// How far back each audit query reaches.
    pub lookback_ms: i64,
    /// Refresh the bearer token when it expires within this many seconds.
    pub token_grace_seconds: i64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("audit-watcher/{}", env!("CARGO_PKG_VERSION")),
            timeout_seconds: 66,
            lookback_ms: 10 * 60 * 60 * 1000,
            token_grace_seconds: 240,
        }
    }
}

/// Reasons the watcher cannot authenticate at all. These end the process.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no authentication provided in the configuration")]
    NotConfigured,

    #[error("there is no entry for the management server ({host}) in the .netrc file")]
    NetrcEntryMissing { host: String },

    #[error("no way to authenticate to the management server")]
    NoCredentialSource,

    #[error("the access token expired and there is no refresh token")]
    NoRefreshToken,

    #[error("the token endpoint rejected the credentials (HTTP {status})")]
    CredentialsRejected { status: u16 },
}

impl AuthError {
    /// Process exit code documented for each auth failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AuthError::NotConfigured => 1,
            AuthError::NetrcEntryMissing { .. } => 2,
            AuthError::NoCredentialSource => 3,
            AuthError::NoRefreshToken => 4,
            AuthError::CredentialsRejected { .. } => 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Authentication failure: {0}")]
    Auth(#[from] AuthError),

    #[error("Audit fetch failed: {0}")]
    Fetch(String),

    #[error("Detail lookup failed: {0}")]
    DetailLookup(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("Malformed classification rule '{rule}': {reason}")]
    ClassificationDefect { rule: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WatcherError {
    /// Only auth failures are allowed to stop the daemon.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WatcherError::Auth(_))
    }
}

pub type Result<T> = std::result::Result<T, WatcherError>;
