//! Service-account OAuth tokens for Google APIs.
//!
//! A signed JWT assertion is exchanged at the key's `token_uri` for a
//! short-lived bearer token, which is cached until shortly before expiry.

use crate::error::{InsightError, InsightResult};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const ANALYTICS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";
pub const SPREADSHEETS_READONLY_SCOPE: &str =
    "https://www.googleapis.com/auth/spreadsheets.readonly";
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

/// The subset of a service-account JSON key that the exchange needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> InsightResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            InsightError::Config(format!(
                "cannot read service-account key {}: {e}",
                path.display()
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            InsightError::Config(format!(
                "invalid service-account key {}: {e}",
                path.display()
            ))
        })
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

enum Source {
    Static(String),
    ServiceAccount {
        key: ServiceAccountKey,
        encoding_key: EncodingKey,
        scopes: Vec<String>,
        http: reqwest::Client,
    },
}

/// Hands out bearer tokens, refreshing them when needed.
pub struct TokenProvider {
    source: Source,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    /// A provider that always returns the given token.
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            source: Source::Static(token.into()),
            cached: Mutex::new(None),
        }
    }

    pub fn service_account(
        key: ServiceAccountKey,
        scopes: &[&str],
        http: reqwest::Client,
    ) -> InsightResult<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| InsightError::Config(format!("invalid private key: {e}")))?;
        Ok(Self {
            source: Source::ServiceAccount {
                key,
                encoding_key,
                scopes: scopes.iter().map(|s| s.to_string()).collect(),
                http,
            },
            cached: Mutex::new(None),
        })
    }

    /// Pick the cheapest available source: a configured token, else the key file.
    pub fn from_settings(
        access_token: Option<&str>,
        credentials_path: Option<&Path>,
        scopes: &[&str],
        http: reqwest::Client,
    ) -> InsightResult<Self> {
        if let Some(token) = access_token {
            return Ok(Self::fixed(token));
        }
        let path = credentials_path.ok_or_else(|| {
            InsightError::Config("GOOGLE_APPLICATION_CREDENTIALS is not set".into())
        })?;
        let key = ServiceAccountKey::from_file(path)?;
        info!(client_email = %key.client_email, "Using service-account credentials");
        Self::service_account(key, scopes, http)
    }

    pub async fn token(&self) -> InsightResult<String> {
        let (key, encoding_key, scopes, http) = match &self.source {
            Source::Static(token) => return Ok(token.clone()),
            Source::ServiceAccount {
                key,
                encoding_key,
                scopes,
                http,
            } => (key, encoding_key, scopes, http),
        };

        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(entry) = cached.as_ref() {
            if entry.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now {
                return Ok(entry.token.clone());
            }
        }

        let assertion = sign_assertion(key, encoding_key, scopes, now)?;
        let response = http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(InsightError::Auth(format!(
                "token exchange rejected ({status}): {body}"
            )));
        }

        let token: TokenResponse = response.json().await?;
        debug!(expires_in = token.expires_in, "Access token refreshed");
        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: now + Duration::seconds(token.expires_in),
        });
        Ok(token.access_token)
    }
}

fn sign_assertion(
    key: &ServiceAccountKey,
    encoding_key: &EncodingKey,
    scopes: &[String],
    now: DateTime<Utc>,
) -> InsightResult<String> {
    let claims = Claims {
        iss: &key.client_email,
        scope: scopes.join(" "),
        aud: &key.token_uri,
        iat: now.timestamp(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
    };
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, encoding_key)
        .map_err(|e| InsightError::Auth(format!("cannot sign assertion: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_token() {
        let provider = TokenProvider::fixed("abc");
        assert_eq!(provider.token().await.unwrap(), "abc");
    }

    #[test]
    fn test_access_token_wins_over_key_file() {
        let provider = TokenProvider::from_settings(
            Some("abc"),
            Some(Path::new("/nonexistent/key.json")),
            &[ANALYTICS_READONLY_SCOPE],
            reqwest::Client::new(),
        );
        assert!(provider.is_ok());
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let result = TokenProvider::from_settings(
            None,
            None,
            &[ANALYTICS_READONLY_SCOPE],
            reqwest::Client::new(),
        );
        assert!(matches!(result, Err(InsightError::Config(_))));
    }

    #[test]
    fn test_unreadable_key_is_config_error() {
        let result = ServiceAccountKey::from_file(Path::new("/nonexistent/key.json"));
        assert!(matches!(result, Err(InsightError::Config(_))));
    }

    #[test]
    fn test_key_defaults_token_uri() {
        let key: ServiceAccountKey = serde_json::from_str(
            r#"{"client_email": "etl@example.iam.gserviceaccount.com", "private_key": "pem"}"#,
        )
        .unwrap();
        assert_eq!(key.token_uri, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_garbage_private_key_rejected() {
        let key = ServiceAccountKey {
            client_email: "etl@example.iam.gserviceaccount.com".into(),
            private_key: "not a pem".into(),
            token_uri: default_token_uri(),
        };
        let result = TokenProvider::service_account(
            key,
            &[ANALYTICS_READONLY_SCOPE],
            reqwest::Client::new(),
        );
        assert!(matches!(result, Err(InsightError::Config(_))));
    }
}
