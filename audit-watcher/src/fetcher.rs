use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::auth::TokenProvider;
use crate::traits::{AuditSource, DetailLookup};
use crate::types::{AuditFetch, AuditTrail, FetchConfig, Result, TimeWindow, WatcherError};

/// The one HTTP client every outbound call goes through.
pub fn build_client(config: &FetchConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_seconds))
        .gzip(true)
        .deflate(true)
        .brotli(true)
        .build()?;
    Ok(client)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportDetails {
    display_name: Option<String>,
}

/// Management API client for one organization.
pub struct ManagementClient {
    client: Client,
    api_base: String,
    organization: String,
    tokens: Arc<TokenProvider>,
}

impl ManagementClient {
    pub fn new(client: Client, api_base: &str, organization: &str, tokens: Arc<TokenProvider>) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            organization: organization.to_string(),
            tokens,
        }
    }

    pub fn audits_url(&self) -> String {
        format!("{}/v1/audits/organizations/{}", self.api_base, self.organization)
    }

    pub fn report_url(&self, report_id: &str) -> String {
        format!("{}/v1/o/{}/reports/{}", self.api_base, self.organization, report_id)
    }
}

#[async_trait]
impl AuditSource for ManagementClient {
    async fn fetch_audits(&self, window: TimeWindow) -> Result<AuditFetch> {
        let authorization = self.tokens.authorization_header().await?;
        let url = self.audits_url();
        let start_time = Instant::now();

        debug!("GET {} [{} .. {}]", url, window.start_ms, window.end_ms);
        let response = self
            .client
            .get(&url)
            .header("Authorization", authorization)
            .header("Accept", "application/json")
            .query(&[
                ("expand", "true".to_string()),
                ("startTime", window.start_ms.to_string()),
                ("endTime", window.end_ms.to_string()),
            ])
            .send()
            .await
            .map_err(|e| WatcherError::Fetch(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            warn!("audit query returned HTTP {}", status);
            return Ok(AuditFetch {
                status,
                records: None,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| WatcherError::Fetch(e.to_string()))?;
        let records = match serde_json::from_str::<AuditTrail>(&body) {
            Ok(trail) => Some(trail.audit_record),
            Err(e) => {
                warn!("cannot parse audit trail: {}", e);
                None
            }
        };

        info!(
            "fetched {} audit records in {}ms",
            records.as_ref().map_or(0, Vec::len),
            start_time.elapsed().as_millis()
        );
        Ok(AuditFetch { status, records })
    }
}

#[async_trait]
impl DetailLookup for ManagementClient {
    async fn report_display_name(&self, report_id: &str) -> Result<Option<String>> {
        let authorization = self.tokens.authorization_header().await?;
        let url = self.report_url(report_id);

        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", authorization)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| WatcherError::DetailLookup(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WatcherError::DetailLookup(format!(
                "HTTP {} for report {}",
                status.as_u16(),
                report_id
            )));
        }

        let details: ReportDetails = response
            .json()
            .await
            .map_err(|e| WatcherError::DetailLookup(e.to_string()))?;
        Ok(details.display_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;

    fn client_for(base: &str) -> ManagementClient {
        let http = build_client(&FetchConfig::default()).unwrap();
        let tokens = Arc::new(TokenProvider::new(
            http.clone(),
            "https://login.example.com",
            Credentials {
                username: "u".into(),
                password: "p".into(),
            },
            240,
        ));
        ManagementClient::new(http, base, "acme", tokens)
    }

    #[test]
    fn urls_are_built_from_the_base() {
        let client = client_for("https://api.example.com/");
        assert_eq!(
            client.audits_url(),
            "https://api.example.com/v1/audits/organizations/acme"
        );
        assert_eq!(
            client.report_url("abc-123"),
            "https://api.example.com/v1/o/acme/reports/abc-123"
        );
    }

    #[test]
    fn client_builds_with_defaults() {
        assert!(build_client(&FetchConfig::default()).is_ok());
    }
}
