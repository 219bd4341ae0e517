//! OAuth credentials for one Google account
//!
//! Token files use Google's "authorized user" JSON layout. keyflow never
//! starts a browser login: a missing, malformed or unrefreshable token file
//! means the account is skipped until someone re-authenticates it.

use crate::error::{GoogleError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The only scope keyflow asks for
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// A token with less time left than this is refreshed before use. One
/// account run can outlast a much shorter margin (readiness polling, ToS
/// prompts).
const DEFAULT_MIN_VALIDITY: Duration = Duration::from_secs(600);

/// A bearer token and the moment it stops working
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub secret: String,
    pub expiry: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Whether the token stays usable for at least `margin` after `now`.
    /// Tokens without a recorded expiry are trusted until rejected.
    pub fn lasts(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.expiry {
            Some(expiry) => (expiry - now).to_std().is_ok_and(|left| left > margin),
            None => true,
        }
    }
}

/// Stored token of one account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default = "default_token_uri")]
    pub token_uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub scopes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,

    /// Fields keyflow does not interpret, written back untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl AuthorizedUser {
    pub async fn load(path: &Path) -> Result<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GoogleError::TokenFileMissing(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|e| GoogleError::TokenFileMalformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// The stored access token, if there is one
    pub fn current_token(&self) -> Option<AccessToken> {
        let secret = self.token.clone().filter(|t| !t.is_empty())?;
        Some(AccessToken {
            secret,
            expiry: self.expiry,
        })
    }
}

/// OAuth client registration (`credentials.json`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Read the `installed` (or `web`) section of a client secrets file
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GoogleError::ClientSecretsMissing(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self> {
        let malformed = |reason: String| GoogleError::ClientSecretsMalformed {
            path: path.to_path_buf(),
            reason,
        };
        let file: ClientSecretsFile =
            serde_json::from_str(content).map_err(|e| malformed(e.to_string()))?;
        file.installed
            .or(file.web)
            .ok_or_else(|| malformed("neither an 'installed' nor a 'web' section".to_string()))
    }
}

/// How hard to try refreshing an expired token
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    pub retries: u32,
    pub delay: Duration,

    /// Stored tokens expiring sooner than this are refreshed
    pub min_validity: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_secs(5),
            min_validity: DEFAULT_MIN_VALIDITY,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Loads and refreshes per-account tokens from the credentials directory
pub struct TokenSource {
    http: reqwest::Client,
    credentials_dir: PathBuf,
    client_secrets: Option<ClientSecrets>,
    policy: RefreshPolicy,
}

impl TokenSource {
    pub fn new(credentials_dir: impl Into<PathBuf>, policy: RefreshPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials_dir: credentials_dir.into(),
            client_secrets: None,
            policy,
        }
    }

    /// Fallback client id/secret for token files that lack them
    pub fn with_client_secrets(mut self, secrets: ClientSecrets) -> Self {
        self.client_secrets = Some(secrets);
        self
    }

    /// `<credentials dir>/<email>.json`
    pub fn token_path(&self, email: &str) -> PathBuf {
        self.credentials_dir.join(format!("{}.json", email))
    }

    pub fn min_validity(&self) -> Duration {
        self.policy.min_validity
    }

    /// A usable access token for `email`, refreshing (and persisting) it when
    /// it expires within [`RefreshPolicy::min_validity`].
    pub async fn access_token(&self, email: &str) -> Result<AccessToken> {
        self.fetch(email, false).await
    }

    /// Refresh the token of `email` even if it looks valid, for a token the
    /// API has already rejected.
    pub async fn refreshed_token(&self, email: &str) -> Result<AccessToken> {
        self.fetch(email, true).await
    }

    async fn fetch(&self, email: &str, force: bool) -> Result<AccessToken> {
        let path = self.token_path(email);
        let mut user = AuthorizedUser::load(&path).await?;

        let stored = user
            .current_token()
            .filter(|token| !force && token.lasts(Utc::now(), self.policy.min_validity));
        if let Some(token) = stored {
            tracing::debug!(email, "Using stored access token");
            return Ok(token);
        }

        let refresh_token = user
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(GoogleError::NoRefreshToken)?;

        let retries = self.policy.retries.max(1);
        let mut last = String::new();
        for attempt in 1..=retries {
            tracing::info!(email, "Refreshing credentials (attempt {}/{})", attempt, retries);
            match self.refresh(&mut user, &refresh_token).await {
                Ok(token) => {
                    user.save(&path).await?;
                    tracing::info!(email, "Successfully refreshed credentials");
                    return Ok(token);
                }
                Err(e) => {
                    tracing::warn!(
                        email,
                        "Failed to refresh credentials on attempt {}: {}",
                        attempt,
                        e
                    );
                    last = e.to_string();
                    if attempt < retries {
                        tokio::time::sleep(self.policy.delay).await;
                    }
                }
            }
        }

        tracing::error!(email, "Failed to refresh credentials after {} attempts", retries);
        Err(GoogleError::RefreshFailed {
            attempts: retries,
            last,
        })
    }

    async fn refresh(
        &self,
        user: &mut AuthorizedUser,
        refresh_token: &str,
    ) -> Result<AccessToken> {
        let fallback = self.client_secrets.as_ref();
        let client_id = user
            .client_id
            .clone()
            .or_else(|| fallback.map(|s| s.client_id.clone()))
            .ok_or(GoogleError::MissingClientSecret)?;
        let client_secret = user
            .client_secret
            .clone()
            .or_else(|| fallback.map(|s| s.client_secret.clone()))
            .ok_or(GoogleError::MissingClientSecret)?;

        let params = [
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let response = self.http.post(&user.token_uri).form(&params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GoogleError::Status {
                status: status.as_u16(),
                message: "token refresh rejected".to_string(),
                body,
            });
        }

        let granted: TokenResponse = response.json().await?;
        let expiry = granted
            .expires_in
            .map(|secs| Utc::now() + ChronoDuration::seconds(secs));
        user.token = Some(granted.access_token.clone());
        user.expiry = expiry;
        user.client_id = Some(client_id);
        user.client_secret = Some(client_secret);
        Ok(AccessToken {
            secret: granted.access_token,
            expiry,
        })
    }
}
