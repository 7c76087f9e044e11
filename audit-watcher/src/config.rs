use chrono_tz::Tz;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::interval;
use crate::types::{Result, WatcherError};

pub const DEFAULT_API_BASE: &str = "https://api.enterprise.apigee.com";
pub const DEFAULT_LOGIN_BASE: &str = "https://login.apigee.com";
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Los_Angeles;

/// Daemon configuration, read from `config/config.json` by default.
///
/// ```json
/// {
///   "organization": "myorgname",
///   "sleepTime" : "10m",
///   "timezone" : "America/Los_Angeles",
///   "auth" : { "netrc" : true },
///   "alert" : {
///     "type" : "slack",
///     "iconUrl" : "https://url.to/image/for/slackpost",
///     "uri" : "https://hooks.slack.com/services/URL/THAT/ACCEPTS/POSTS"
///   }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherConfig {
    pub organization: String,
    pub sleep_time: Option<String>,
    /// IANA zone name used for timestamps in alerts.
    pub timezone: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_login_base")]
    pub login_base: String,
    pub auth: Option<AuthSection>,
    pub alert: AlertSection,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_login_base() -> String {
    DEFAULT_LOGIN_BASE.to_string()
}

/// Where the management credentials come from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSection {
    /// Read login/password for the API host from `~/.netrc`.
    #[serde(default)]
    pub netrc: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Slack,
    GoogleChat,
    #[serde(alias = "hipchat")]
    Plain,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSection {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub uri: String,
    pub icon_url: Option<String>,
    /// Sent as a bearer token with every webhook post.
    pub token: Option<String>,
    /// JSON object whose string values get `%message%` substituted (plain alerts).
    pub template: Option<serde_json::Value>,
}

impl WatcherConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(WatcherError::Config(format!(
                "{} not found",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| WatcherError::Config(format!("failed to parse configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.organization.trim().is_empty() {
            return Err(WatcherError::Config("organization must not be empty".into()));
        }
        if let Some(token) = &self.sleep_time {
            interval::parse(token)?;
        }
        if let Some(zone) = &self.timezone {
            zone.parse::<Tz>()
                .map_err(|e| WatcherError::Config(format!("unknown timezone {zone:?}: {e}")))?;
        }
        url::Url::parse(&self.api_base)?;
        url::Url::parse(&self.login_base)?;
        url::Url::parse(&self.alert.uri)?;
        if let Some(template) = &self.alert.template {
            if !template.is_object() {
                return Err(WatcherError::Config("alert.template must be a JSON object".into()));
            }
        }
        Ok(())
    }

    /// Sleep between cycles; ten minutes when unset.
    pub fn sleep_duration(&self) -> Duration {
        self.sleep_time
            .as_deref()
            .and_then(|token| interval::parse(token).ok())
            .unwrap_or(interval::DEFAULT_SLEEP)
    }

    /// Display zone for alerts; `America/Los_Angeles` when unset.
    pub fn timezone(&self) -> Tz {
        self.timezone
            .as_deref()
            .and_then(|zone| zone.parse().ok())
            .unwrap_or(DEFAULT_TIMEZONE)
    }
}
