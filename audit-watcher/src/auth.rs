//! Bearer tokens for the management API.
//!
//! Tokens come from the OAuth password grant at `<loginBase>/oauth/token` and
//! are refreshed with the refresh grant shortly before they expire.

use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::AuthSection;
use crate::types::{AuthError, Result, WatcherError};

/// Public client id/secret of the management CLI, base64 encoded.
const CLIENT_BASIC_AUTH: &str = "ZWRnZWNsaTplZGdlY2xpc2VjcmV0";

/// Assumed lifetime when the token response says nothing about expiry.
const FALLBACK_LIFETIME_SECS: i64 = 30 * 60;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    /// Resolve credentials for the management host `api_host`.
    pub fn resolve(auth: Option<&AuthSection>, api_host: &str) -> Result<Self> {
        let auth = auth.ok_or(AuthError::NotConfigured)?;

        if auth.netrc {
            let path = dirs::home_dir()
                .map(|home| home.join(".netrc"))
                .ok_or(AuthError::NoCredentialSource)?;
            return Self::from_netrc_file(&path, api_host);
        }

        match (&auth.username, &auth.password) {
            (Some(username), Some(password)) => Ok(Self {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => Err(AuthError::NoCredentialSource.into()),
        }
    }

    pub fn from_netrc_file(path: &Path, host: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            warn!("cannot read {}: {}", path.display(), e);
            AuthError::NetrcEntryMissing {
                host: host.to_string(),
            }
        })?;
        parse_netrc(&content, host).ok_or_else(|| {
            AuthError::NetrcEntryMissing {
                host: host.to_string(),
            }
            .into()
        })
    }
}

/// Find the login/password pair for `host` in netrc text. A `default` entry
/// is used when no machine matches.
pub fn parse_netrc(content: &str, host: &str) -> Option<Credentials> {
    #[derive(Default)]
    struct Entry {
        machine: Option<String>,
        login: Option<String>,
        password: Option<String>,
    }

    let mut entries: Vec<Entry> = Vec::new();
    let mut tokens = content.split_whitespace();
    while let Some(token) = tokens.next() {
        match token {
            "machine" => entries.push(Entry {
                machine: tokens.next().map(str::to_string),
                ..Default::default()
            }),
            "default" => entries.push(Entry::default()),
            "login" | "password" | "account" => {
                let value = tokens.next().map(str::to_string);
                if let Some(entry) = entries.last_mut() {
                    match token {
                        "login" => entry.login = value,
                        "password" => entry.password = value,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    let pick = |entry: &Entry| match (&entry.login, &entry.password) {
        (Some(username), Some(password)) => Some(Credentials {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    };

    entries
        .iter()
        .find(|e| e.machine.as_deref() == Some(host))
        .and_then(pick)
        .or_else(|| entries.iter().find(|e| e.machine.is_none()).and_then(pick))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    /// Epoch milliseconds.
    issued_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct JwtClaims {
    exp: Option<i64>,
}

#[derive(Debug, Clone)]
struct TokenState {
    access_token: String,
    refresh_token: Option<String>,
    /// Epoch seconds.
    expires_at: i64,
}

/// Expiry of a JWT access token, from its `exp` claim.
pub fn jwt_expiry(access_token: &str) -> Option<i64> {
    let mut parts = access_token.split('.');
    let (_, payload, _) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: JwtClaims = serde_json::from_slice(&bytes).ok()?;
    claims.exp
}

fn expiry_of(response: &TokenResponse, access_token: &str, now: i64) -> i64 {
    if let Some(exp) = jwt_expiry(access_token) {
        return exp;
    }
    match (response.issued_at, response.expires_in) {
        (Some(issued_ms), Some(expires_in)) => issued_ms / 1000 + expires_in,
        (None, Some(expires_in)) => now + expires_in,
        _ => now + FALLBACK_LIFETIME_SECS,
    }
}

enum Grant<'a> {
    Password(&'a Credentials),
    Refresh(&'a str),
}

/// Hands out a valid `Authorization` header value, fetching or refreshing the
/// token as needed.
pub struct TokenProvider {
    client: Client,
    token_url: String,
    credentials: Credentials,
    grace_seconds: i64,
    state: Mutex<Option<TokenState>>,
}

impl TokenProvider {
    pub fn new(client: Client, login_base: &str, credentials: Credentials, grace_seconds: i64) -> Self {
        Self {
            client,
            token_url: format!("{}/oauth/token", login_base.trim_end_matches('/')),
            credentials,
            grace_seconds,
            state: Mutex::new(None),
        }
    }

    pub async fn authorization_header(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        let now = Utc::now().timestamp();

        let token = match state.take() {
            None => self.request(Grant::Password(&self.credentials), now).await?,
            Some(current) if current.expires_at > now + self.grace_seconds => current,
            Some(current) => {
                let Some(refresh_token) = current.refresh_token.as_deref() else {
                    return Err(AuthError::NoRefreshToken.into());
                };
                debug!("access token expires at {}, refreshing", current.expires_at);
                match self.request(Grant::Refresh(refresh_token), now).await {
                    Err(WatcherError::Auth(AuthError::CredentialsRejected { status })) => {
                        warn!("refresh token rejected (HTTP {}), signing in again", status);
                        self.request(Grant::Password(&self.credentials), now).await?
                    }
                    other => other?,
                }
            }
        };

        let header = format!("Bearer {}", token.access_token);
        *state = Some(token);
        Ok(header)
    }

    async fn request(&self, grant: Grant<'_>, now: i64) -> Result<TokenState> {
        let form: Vec<(&str, &str)> = match grant {
            Grant::Password(credentials) => vec![
                ("grant_type", "password"),
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ],
            Grant::Refresh(refresh_token) => {
                vec![("grant_type", "refresh_token"), ("refresh_token", refresh_token)]
            }
        };

        debug!("POST {}", self.token_url);
        let response = self
            .client
            .post(&self.token_url)
            .header("Authorization", format!("Basic {CLIENT_BASIC_AUTH}"))
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| WatcherError::Fetch(format!("token request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::CredentialsRejected {
                status: status.as_u16(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(WatcherError::Fetch(format!(
                "token endpoint returned HTTP {status}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| WatcherError::Fetch(format!("invalid token response: {e}")))?;
        let access_token = body
            .access_token
            .clone()
            .ok_or_else(|| WatcherError::Fetch("invalid token response: no access_token".into()))?;

        let expires_at = expiry_of(&body, &access_token, now);
        info!("obtained access token, expires at {}", expires_at);

        Ok(TokenState {
            access_token,
            refresh_token: body.refresh_token,
            expires_at,
        })
    }
}
