//! Provider discovery and selection.

use std::sync::{Arc, RwLock};

use duet_core::error::{DuetError, Result};
use duet_core::provider::{GatewayHealth, ProviderMap};
use duet_interaction::CompletionGateway;
use tokio::sync::RwLock as AsyncRwLock;

/// Caches the gateway's provider list and tracks which provider is selected.
pub struct ProviderRegistry {
    gateway: Arc<dyn CompletionGateway>,
    selected: RwLock<String>,
    cache: AsyncRwLock<Option<ProviderMap>>,
}

impl ProviderRegistry {
    pub fn new(gateway: Arc<dyn CompletionGateway>, selected: impl Into<String>) -> Self {
        Self {
            gateway,
            selected: RwLock::new(selected.into()),
            cache: AsyncRwLock::new(None),
        }
    }

    pub fn gateway(&self) -> Arc<dyn CompletionGateway> {
        self.gateway.clone()
    }

    pub fn selected(&self) -> String {
        self.selected
            .read()
            .map(|id| id.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Fetches the provider list again and replaces the cache.
    pub async fn refresh(&self) -> Result<ProviderMap> {
        let providers = self.gateway.providers().await?;
        tracing::debug!("[Providers] Discovered {} provider(s)", providers.len());
        *self.cache.write().await = Some(providers.clone());
        Ok(providers)
    }

    /// The cached provider list, fetched on first use.
    pub async fn list(&self) -> Result<ProviderMap> {
        if let Some(providers) = self.cache.read().await.as_ref() {
            return Ok(providers.clone());
        }
        self.refresh().await
    }

    /// Switches to another provider known to the gateway.
    pub async fn select(&self, id: &str) -> Result<()> {
        let providers = self.refresh().await?;
        if !providers.contains_key(id) {
            return Err(DuetError::not_found("Provider", id));
        }
        match self.selected.write() {
            Ok(mut selected) => *selected = id.to_string(),
            Err(poisoned) => *poisoned.into_inner() = id.to_string(),
        }
        tracing::info!("[Providers] Selected provider '{}'", id);
        Ok(())
    }

    /// Returns the selected provider id if the gateway reports it available.
    ///
    /// A cached "unavailable" answer is checked once more against the gateway
    /// before giving up, since keys may have been configured since.
    pub async fn ensure_available(&self) -> Result<String> {
        let selected = self.selected();
        let providers = self.list().await?;
        if is_available(&providers, &selected) {
            return Ok(selected);
        }

        let providers = self.refresh().await?;
        if is_available(&providers, &selected) {
            return Ok(selected);
        }
        Err(DuetError::config_unavailable(format!(
            "Provider '{selected}' is not available"
        )))
    }

    pub async fn health(&self) -> Result<GatewayHealth> {
        self.gateway.health().await
    }
}

fn is_available(providers: &ProviderMap, id: &str) -> bool {
    providers.get(id).is_some_and(|info| info.available)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockGateway;

    #[tokio::test]
    async fn test_available_provider_passes() {
        let gateway = Arc::new(MockGateway::new());
        let registry = ProviderRegistry::new(gateway.clone(), "tongyi");

        assert_eq!(registry.ensure_available().await.unwrap(), "tongyi");
        assert_eq!(registry.ensure_available().await.unwrap(), "tongyi");
        assert_eq!(gateway.provider_calls(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_provider_is_config_unavailable() {
        let gateway = Arc::new(MockGateway::new());
        let registry = ProviderRegistry::new(gateway.clone(), "deepseek");

        let err = registry.ensure_available().await.unwrap_err();
        assert!(err.is_config_unavailable());
        // Cached answer was re-checked once.
        assert_eq!(gateway.provider_calls(), 2);
    }

    #[tokio::test]
    async fn test_select_unknown_provider() {
        let registry = ProviderRegistry::new(Arc::new(MockGateway::new()), "tongyi");

        let err = registry.select("openai").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(registry.selected(), "tongyi");

        registry.select("deepseek").await.unwrap();
        assert_eq!(registry.selected(), "deepseek");
    }
}
