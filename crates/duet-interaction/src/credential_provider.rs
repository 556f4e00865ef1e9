//! Speech-service credential provider.
//!
//! Temporary credentials come from a trust server and are cached in memory.
//! They are refreshed once less than the safety margin remains before
//! expiry; a failed refresh falls back to a fresh fetch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use duet_core::error::{DuetError, Result};
use duet_core::speech::{CredentialGrant, Credentials, DEFAULT_REFRESH_MARGIN_MS};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use tokio::sync::Mutex;

type HmacSha1 = Hmac<Sha1>;

/// Returns the current Unix time in milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

/// Where credentials come from.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Requests a brand-new credential set.
    async fn fetch(&self) -> Result<CredentialGrant>;

    /// Extends the trust-server session identified by `session_id`.
    async fn refresh(&self, session_id: Option<&str>) -> Result<CredentialGrant>;
}

/// Caches credentials and keeps them valid.
pub struct CredentialProvider {
    source: Arc<dyn CredentialSource>,
    cached: Mutex<Option<CredentialGrant>>,
    margin_ms: i64,
    clock: Clock,
}

impl CredentialProvider {
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
            margin_ms: DEFAULT_REFRESH_MARGIN_MS,
            clock: system_clock(),
        }
    }

    pub fn with_margin_ms(mut self, margin_ms: i64) -> Self {
        self.margin_ms = margin_ms;
        self
    }

    /// Replaces the time source (tests).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Returns credentials with more than the margin left before expiry.
    ///
    /// # Returns
    ///
    /// - `Ok(Credentials)`: Cached, refreshed or freshly fetched credentials
    /// - `Err(DuetError::AuthFailure)`: Neither refresh nor fetch succeeded
    pub async fn get_valid(&self) -> Result<Credentials> {
        let mut cached = self.cached.lock().await;
        let now = (self.clock)();

        if let Some(grant) = cached.as_ref() {
            if !grant.credentials.needs_refresh(now, self.margin_ms) {
                return Ok(grant.credentials.clone());
            }
        }

        let grant = match cached.as_ref() {
            Some(previous) => {
                tracing::info!(
                    "[Credentials] Refreshing ({} ms left)",
                    previous.credentials.remaining_ms(now)
                );
                match self.source.refresh(previous.session_id.as_deref()).await {
                    Ok(grant) => grant,
                    Err(err) => {
                        tracing::info!("[Credentials] Refresh failed, fetching new credentials: {}", err);
                        self.fetch_fresh().await?
                    }
                }
            }
            None => self.fetch_fresh().await?,
        };

        // A refresh response may omit the session id; keep the one we had.
        let session_id = grant
            .session_id
            .clone()
            .or_else(|| cached.as_ref().and_then(|g| g.session_id.clone()));
        let credentials = grant.credentials.clone();
        *cached = Some(CredentialGrant {
            credentials: grant.credentials,
            session_id,
        });

        Ok(credentials)
    }

    /// Signs `text` with the current temporary secret.
    pub async fn sign(&self, text: &str) -> Result<String> {
        let credentials = self.get_valid().await?;
        hmac_sha1_base64(&credentials.secret, text)
    }

    async fn fetch_fresh(&self) -> Result<CredentialGrant> {
        self.source.fetch().await.map_err(|err| match err {
            DuetError::AuthFailure(_) => err,
            other => DuetError::auth(other.to_string()),
        })
    }
}

/// HMAC-SHA1 of `text` keyed by `secret`, base64 encoded.
pub fn hmac_sha1_base64(secret: &str, text: &str) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| DuetError::auth(format!("Invalid signing key: {e}")))?;
    mac.update(text.as_bytes());
    Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
}

/// Trust-server client (`/speech/sts-credentials`, `/speech/sts-refresh`).
#[derive(Clone)]
pub struct HttpCredentialSource {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpCredentialSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/speech/{}", self.base_url, path)
    }

    async fn read_grant(&self, response: reqwest::Result<reqwest::Response>) -> Result<CredentialGrant> {
        let response = response.map_err(|err| DuetError::auth(format!("Trust server unreachable: {err}")))?;
        let status = response.status();
        let body: StsResponse = response
            .json()
            .await
            .map_err(|err| DuetError::auth(format!("Invalid trust server response ({status}): {err}")))?;
        body.into_grant()
    }
}

#[async_trait]
impl CredentialSource for HttpCredentialSource {
    async fn fetch(&self) -> Result<CredentialGrant> {
        let response = self
            .client
            .get(self.endpoint("sts-credentials"))
            .timeout(self.timeout)
            .send()
            .await;
        self.read_grant(response).await
    }

    async fn refresh(&self, session_id: Option<&str>) -> Result<CredentialGrant> {
        let response = self
            .client
            .post(self.endpoint("sts-refresh"))
            .timeout(self.timeout)
            .json(&RefreshBody { session_id })
            .send()
            .await;
        self.read_grant(response).await
    }
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    session_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct StsResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    credentials: Option<StsCredentials>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Credential payload; accepts both the short and the STS field names.
#[derive(Deserialize)]
struct StsCredentials {
    #[serde(alias = "tmpSecretId")]
    id: String,
    #[serde(alias = "tmpSecretKey")]
    secret: String,
    #[serde(alias = "sessionToken")]
    token: String,
    #[serde(rename = "appId", alias = "app_id", deserialize_with = "string_or_number")]
    app_id: String,
    /// Unix seconds
    #[serde(rename = "expiredTime")]
    expired_time: i64,
    #[serde(default)]
    region: Option<String>,
}

impl StsResponse {
    fn into_grant(self) -> Result<CredentialGrant> {
        if !self.success {
            return Err(DuetError::auth(
                self.error
                    .unwrap_or_else(|| "Trust server rejected the request".to_string()),
            ));
        }
        let raw = self
            .credentials
            .ok_or_else(|| DuetError::auth("Trust server returned no credentials"))?;

        Ok(CredentialGrant {
            credentials: Credentials {
                id: raw.id,
                secret: raw.secret,
                token: raw.token,
                app_id: raw.app_id,
                expires_at_ms: raw.expired_time.saturating_mul(1000),
                region: raw.region,
            },
            session_id: self.session_id,
        })
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => Ok(text),
        serde_json::Value::Number(number) => Ok(number.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for appId, got {other}"
        ))),
    }
}
