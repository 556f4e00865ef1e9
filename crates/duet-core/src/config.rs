//! Application configuration model.
//!
//! Loaded from `config.toml` by the infrastructure layer. Every field has a
//! default so a partial (or missing) file is always valid.

use serde::{Deserialize, Serialize};

use crate::exchange::DEFAULT_CONTEXT_LIMIT;
use crate::speech::{DEFAULT_REFRESH_MARGIN_MS, RecognitionParams};

pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_PROVIDER: &str = "tongyi";
pub const DEFAULT_ASR_HOST: &str = "asr.cloud.tencent.com";

/// Root of `config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub history: HistoryConfig,
    pub speech: SpeechConfig,
}

impl AppConfig {
    /// Base URL of the trust server, falling back to the gateway.
    pub fn trust_server_url(&self) -> &str {
        self.speech
            .trust_server_url
            .as_deref()
            .unwrap_or(&self.gateway.base_url)
    }
}

/// Completion gateway connection and sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Provider id sent with every completion request
    pub provider: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Longest tolerated silence between two stream chunks
    pub stream_idle_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GATEWAY_URL.to_string(),
            provider: DEFAULT_PROVIDER.to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            stream_idle_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of prior exchanges sent per role
    pub context_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            context_limit: DEFAULT_CONTEXT_LIMIT,
        }
    }
}

/// Speech credential and recognition settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Trust server base URL; `None` means "same as the gateway"
    pub trust_server_url: Option<String>,
    pub refresh_margin_secs: u64,
    pub request_timeout_secs: u64,
    /// Bound on the recognizer WebSocket connect and on its acknowledgment
    pub connect_timeout_secs: u64,
    pub endpoint_host: String,
    #[serde(flatten)]
    pub params: RecognitionParams,
}

impl SpeechConfig {
    pub fn refresh_margin_ms(&self) -> i64 {
        i64::try_from(self.refresh_margin_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            trust_server_url: None,
            refresh_margin_secs: (DEFAULT_REFRESH_MARGIN_MS / 1000) as u64,
            request_timeout_secs: 15,
            connect_timeout_secs: 10,
            endpoint_host: DEFAULT_ASR_HOST.to_string(),
            params: RecognitionParams::default(),
        }
    }
}
