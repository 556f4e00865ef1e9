//! Chat service: the conversation side of the application.
//!
//! Holds the in-memory exchange log, the role prompts and the orchestrator,
//! and keeps the stores in step with what the user sees.

use std::sync::Arc;
use std::time::Duration;

use duet_core::config::AppConfig;
use duet_core::error::{DuetError, Result};
use duet_core::exchange::{ConversationExchange, ExchangeRepository};
use duet_core::prompt::{PromptRepository, RoleId, RolePrompt, RolePrompts};
use duet_core::provider::{GatewayHealth, ProviderMap};
use duet_infrastructure::{DuetPaths, JsonExchangeRepository, TomlPromptRepository};
use duet_interaction::{CompletionGateway, HttpCompletionGateway};
use tokio::sync::{Mutex, RwLock};

use crate::markdown::RenderTarget;
use crate::orchestrator::{DualCompletionOrchestrator, SubmitOutcome};
use crate::provider_registry::ProviderRegistry;

pub struct ChatService {
    orchestrator: DualCompletionOrchestrator,
    registry: Arc<ProviderRegistry>,
    prompts: Arc<dyn PromptRepository>,
    history: Arc<dyn ExchangeRepository>,
    log: RwLock<Vec<ConversationExchange>>,
    /// Held from reading the history until the new exchange is in `log`
    submitting: Mutex<()>,
}

impl ChatService {
    pub fn new(
        gateway: Arc<dyn CompletionGateway>,
        prompts: Arc<dyn PromptRepository>,
        history: Arc<dyn ExchangeRepository>,
        provider: impl Into<String>,
        context_limit: usize,
    ) -> Self {
        let registry = Arc::new(ProviderRegistry::new(gateway, provider));
        let orchestrator = DualCompletionOrchestrator::new(registry.clone(), history.clone(), context_limit);
        Self {
            orchestrator,
            registry,
            prompts,
            history,
            log: RwLock::new(Vec::new()),
            submitting: Mutex::new(()),
        }
    }

    /// Wires the HTTP gateway and the file stores under `paths`.
    pub fn open(config: &AppConfig, paths: &DuetPaths) -> Result<Self> {
        let gateway = HttpCompletionGateway::new(&config.gateway)?;
        Ok(Self::new(
            Arc::new(gateway),
            Arc::new(TomlPromptRepository::new(paths)),
            Arc::new(JsonExchangeRepository::new(paths)),
            config.gateway.provider.clone(),
            config.history.context_limit,
        ))
    }

    /// Loads the stored history into memory and returns it for replay.
    pub async fn load(&self) -> Result<Vec<ConversationExchange>> {
        let exchanges = self.history.load_all().await?;
        tracing::info!("[Chat] Loaded {} exchange(s)", exchanges.len());
        *self.log.write().await = exchanges.clone();
        Ok(exchanges)
    }

    /// Submits one utterance to both roles with the current prompts.
    pub async fn submit(
        &self,
        user_input: &str,
        target_a: &mut dyn RenderTarget,
        target_b: &mut dyn RenderTarget,
    ) -> Result<SubmitOutcome> {
        let _submitting = self
            .submitting
            .try_lock()
            .map_err(|_| DuetError::Busy("A submission is already in progress".to_string()))?;
        let prompts = self.prompts.load().await?;
        let history = self.log.read().await.clone();
        let outcome = self
            .orchestrator
            .submit(user_input, &prompts, &history, target_a, target_b)
            .await?;
        if outcome.appended {
            self.log.write().await.push(outcome.exchange.clone());
        }
        Ok(outcome)
    }

    pub async fn history(&self) -> Vec<ConversationExchange> {
        self.log.read().await.clone()
    }

    /// Clears the history; prompts are kept.
    pub async fn clear_history(&self) -> Result<()> {
        let _submitting = self.submitting.lock().await;
        self.history.clear().await?;
        self.log.write().await.clear();
        Ok(())
    }

    pub async fn prompts(&self) -> Result<RolePrompts> {
        self.prompts.load().await
    }

    pub async fn set_prompt(&self, role: RoleId, text: &str) -> Result<()> {
        self.prompts.save(&RolePrompt::new(role, text)).await
    }

    pub async fn reset_prompt(&self, role: RoleId) -> Result<()> {
        self.prompts.reset(role).await
    }

    pub async fn providers(&self) -> Result<ProviderMap> {
        self.registry.refresh().await
    }

    pub fn provider(&self) -> String {
        self.registry.selected()
    }

    pub async fn select_provider(&self, id: &str) -> Result<()> {
        self.registry.select(id).await
    }

    /// Checks that the gateway answers, with a short overall bound.
    pub async fn health(&self) -> Result<GatewayHealth> {
        match tokio::time::timeout(Duration::from_secs(5), self.registry.health()).await {
            Ok(result) => result,
            Err(_) => Err(DuetError::config_unavailable("Gateway health check timed out")),
        }
    }
}
