//! Exchange repository trait.
//!
//! Defines the interface for the conversation history store.

use super::model::ConversationExchange;
use crate::error::Result;

/// An append-only store for finished exchanges.
///
/// The log is replayed in chronological order on start. Entries are never
/// edited after they are appended; the only destructive operation is clearing
/// the whole log on user request.
#[async_trait::async_trait]
pub trait ExchangeRepository: Send + Sync {
    /// Loads every stored exchange in append order.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<ConversationExchange>)`: The full log (empty when nothing is stored)
    /// - `Err(DuetError)`: Error if the log cannot be read
    async fn load_all(&self) -> Result<Vec<ConversationExchange>>;

    /// Appends one exchange to the end of the log.
    async fn append(&self, exchange: &ConversationExchange) -> Result<()>;

    /// Removes every stored exchange.
    async fn clear(&self) -> Result<()>;
}
