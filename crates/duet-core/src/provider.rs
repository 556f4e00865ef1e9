//! Completion providers advertised by the gateway.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One entry of the gateway's `GET /providers` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub available: bool,
}

/// Provider id → description, ordered by id.
pub type ProviderMap = BTreeMap<String, ProviderInfo>;

/// Result of the gateway's `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayHealth {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "supported_providers")]
    pub providers: Vec<String>,
}

impl GatewayHealth {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy") || self.status.eq_ignore_ascii_case("ok")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_payloads() {
        let providers: ProviderMap = serde_json::from_str(
            r#"{"tongyi": {"name": "Tongyi", "model": "qwen-plus", "available": true},
                "deepseek": {"name": "DeepSeek", "available": false}}"#,
        )
        .unwrap();
        assert_eq!(providers.keys().collect::<Vec<_>>(), vec!["deepseek", "tongyi"]);
        assert!(providers["tongyi"].available);
        assert_eq!(providers["deepseek"].model, None);

        let health: GatewayHealth = serde_json::from_str(
            r#"{"status": "healthy", "supported_providers": ["tongyi", "deepseek"]}"#,
        )
        .unwrap();
        assert!(health.is_healthy());
        assert_eq!(health.providers.len(), 2);
    }
}
