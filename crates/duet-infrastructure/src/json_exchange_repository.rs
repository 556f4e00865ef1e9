//! JSON-file ExchangeRepository implementation.

use std::path::PathBuf;

use duet_core::error::{DuetError, Result};
use duet_core::exchange::{ConversationExchange, ExchangeRepository};

use crate::paths::DuetPaths;
use crate::storage::AtomicFile;

/// Stores the exchange log as a single JSON array (`history.json`).
///
/// The array uses the same item shape as the browser's `chatHistory` entry,
/// so an exported history can be dropped in place.
pub struct JsonExchangeRepository {
    file: AtomicFile<Vec<ConversationExchange>>,
}

impl JsonExchangeRepository {
    /// Creates a repository at the default location.
    pub fn new(paths: &DuetPaths) -> Self {
        Self::with_path(paths.history_file())
    }

    /// Creates a repository backed by a custom file (for testing).
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            file: AtomicFile::json(path),
        }
    }

    async fn run_blocking<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(AtomicFile<Vec<ConversationExchange>>) -> Result<R> + Send + 'static,
    {
        let file = self.file.clone();
        tokio::task::spawn_blocking(move || f(file))
            .await
            .map_err(|e| DuetError::internal(format!("History task failed: {}", e)))?
    }
}

#[async_trait::async_trait]
impl ExchangeRepository for JsonExchangeRepository {
    async fn load_all(&self) -> Result<Vec<ConversationExchange>> {
        let exchanges = self
            .run_blocking(|file| Ok(file.load()?.unwrap_or_default()))
            .await?;
        tracing::debug!("[History] Loaded {} exchanges", exchanges.len());
        Ok(exchanges)
    }

    async fn append(&self, exchange: &ConversationExchange) -> Result<()> {
        let exchange = exchange.clone();
        self.run_blocking(move |file| {
            file.update(Vec::new(), |log| {
                log.push(exchange);
                Ok(())
            })?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.run_blocking(|file| Ok(file.remove()?)).await?;
        tracing::info!("[History] Cleared exchange log");
        Ok(())
    }
}
