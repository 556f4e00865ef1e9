//! Short-lived speech-service credentials.

use serde::{Deserialize, Serialize};

/// Credentials are refreshed once less than this much lifetime remains.
pub const DEFAULT_REFRESH_MARGIN_MS: i64 = 5 * 60 * 1000;

/// Temporary credentials issued by the trust server.
///
/// Never persisted; they live in the credential provider's cache only.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub id: String,
    pub secret: String,
    pub token: String,
    pub app_id: String,
    /// Absolute expiry in Unix milliseconds
    pub expires_at_ms: i64,
    #[serde(default)]
    pub region: Option<String>,
}

impl Credentials {
    /// Milliseconds left before expiry (negative once expired).
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        self.expires_at_ms - now_ms
    }

    /// Whether these credentials must be refreshed before use.
    ///
    /// They stay usable only while strictly more than `margin_ms` remains.
    pub fn needs_refresh(&self, now_ms: i64, margin_ms: i64) -> bool {
        self.remaining_ms(now_ms) <= margin_ms
    }
}

// Keep the secret and token out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .field("token", &"<redacted>")
            .field("app_id", &self.app_id)
            .field("expires_at_ms", &self.expires_at_ms)
            .field("region", &self.region)
            .finish()
    }
}

/// Credentials together with the trust-server session they belong to.
///
/// The session id is what a later refresh call presents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialGrant {
    pub credentials: Credentials,
    pub session_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(expires_at_ms: i64) -> Credentials {
        Credentials {
            id: "AKID".to_string(),
            secret: "secret".to_string(),
            token: "token".to_string(),
            app_id: "1250000000".to_string(),
            expires_at_ms,
            region: None,
        }
    }

    #[test]
    fn test_needs_refresh_inside_margin() {
        let now = 1_000_000;
        assert!(credentials(now + DEFAULT_REFRESH_MARGIN_MS - 1).needs_refresh(now, DEFAULT_REFRESH_MARGIN_MS));
        assert!(credentials(now + DEFAULT_REFRESH_MARGIN_MS).needs_refresh(now, DEFAULT_REFRESH_MARGIN_MS));
        assert!(!credentials(now + DEFAULT_REFRESH_MARGIN_MS + 1).needs_refresh(now, DEFAULT_REFRESH_MARGIN_MS));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", credentials(0));
        assert!(!rendered.contains("\"secret\""));
        assert!(rendered.contains("<redacted>"));
    }
}
