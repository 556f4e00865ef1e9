//! Dual-completion orchestration.
//!
//! One submission runs both roles concurrently against the completion
//! gateway. Each role streams into its own renderer, falls back to a single
//! non-streaming call when the stream fails or stays empty, and settles with
//! either text or a failure marker. The exchange is recorded once both roles
//! have settled.

use std::sync::Arc;

use duet_core::error::{DuetError, Result};
use duet_core::exchange::{CompletionRequest, ConversationExchange, ExchangeRepository};
use duet_core::prompt::{RoleId, RolePrompts};
use futures::StreamExt;
use tokio::sync::Mutex;

use crate::markdown::{MarkdownRenderer, RenderStatus, RenderTarget};
use crate::provider_registry::ProviderRegistry;

/// Where a role's final text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplySource {
    Stream,
    Fallback,
    /// Both the stream and the fallback failed; the reply is empty
    Failed,
}

/// How one role settled.
#[derive(Debug, Clone)]
pub struct RoleOutcome {
    pub role: RoleId,
    pub text: String,
    pub source: ReplySource,
    /// The error that ended the stream, if any
    pub stream_error: Option<DuetError>,
    /// The error that ended the fallback, if the role failed
    pub fallback_error: Option<DuetError>,
}

/// Result of a submission.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub exchange: ConversationExchange,
    /// Whether the exchange was written to the history store
    pub appended: bool,
    pub role_a: RoleOutcome,
    pub role_b: RoleOutcome,
}

impl SubmitOutcome {
    pub fn role(&self, role: RoleId) -> &RoleOutcome {
        match role {
            RoleId::A => &self.role_a,
            RoleId::B => &self.role_b,
        }
    }
}

/// Runs both roles for one user utterance.
pub struct DualCompletionOrchestrator {
    registry: Arc<ProviderRegistry>,
    history: Arc<dyn ExchangeRepository>,
    context_limit: usize,
    in_flight: Mutex<()>,
}

impl DualCompletionOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        history: Arc<dyn ExchangeRepository>,
        context_limit: usize,
    ) -> Self {
        Self {
            registry,
            history,
            context_limit,
            in_flight: Mutex::new(()),
        }
    }

    /// Submits `user_input` to both roles and records the exchange.
    ///
    /// Errors are returned only for submissions rejected up front: empty
    /// input, another submission in flight, or no available provider.
    /// Per-role failures are reported in the outcome and rendered inline.
    ///
    /// # Arguments
    ///
    /// * `user_input` - The utterance to send
    /// * `prompts` - Current system prompts of both roles
    /// * `history` - Prior exchanges, oldest first
    /// * `target_a` / `target_b` - Where each role's reply is rendered
    pub async fn submit(
        &self,
        user_input: &str,
        prompts: &RolePrompts,
        history: &[ConversationExchange],
        target_a: &mut dyn RenderTarget,
        target_b: &mut dyn RenderTarget,
    ) -> Result<SubmitOutcome> {
        let user_input = user_input.trim();
        if user_input.is_empty() {
            return Err(DuetError::invalid_input("Message is empty"));
        }
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| DuetError::Busy("A submission is already in progress".to_string()))?;
        let provider = self.registry.ensure_available().await?;

        let request_a =
            CompletionRequest::for_role(prompts.get(RoleId::A), history, self.context_limit, user_input);
        let request_b =
            CompletionRequest::for_role(prompts.get(RoleId::B), history, self.context_limit, user_input);

        tracing::info!(
            "[Orchestrator] Submitting to '{}' with {} prior exchange(s)",
            provider,
            history.len()
        );
        let (role_a, role_b) = tokio::join!(
            self.run_role(&provider, request_a, target_a),
            self.run_role(&provider, request_b, target_b),
        );

        let exchange = ConversationExchange::new(user_input, role_a.text.clone(), role_b.text.clone());
        let appended = if exchange.has_reply() {
            match self.history.append(&exchange).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!("[Orchestrator] Failed to save exchange: {}", e);
                    false
                }
            }
        } else {
            tracing::warn!("[Orchestrator] Both roles failed; exchange not recorded");
            false
        };

        Ok(SubmitOutcome {
            exchange,
            appended,
            role_a,
            role_b,
        })
    }

    async fn run_role(
        &self,
        provider: &str,
        request: CompletionRequest,
        target: &mut dyn RenderTarget,
    ) -> RoleOutcome {
        let role = request.role_id;
        target.set_status(RenderStatus::Thinking);

        let mut renderer = MarkdownRenderer::new(&mut *target);
        let streamed = self.stream_into(provider, &request, &mut renderer).await;
        let stream_error = match streamed {
            Ok(text) if !text.trim().is_empty() => {
                renderer.end();
                return RoleOutcome {
                    role,
                    text,
                    source: ReplySource::Stream,
                    stream_error: None,
                    fallback_error: None,
                };
            }
            Ok(_) => {
                tracing::info!("[Orchestrator] Role {} stream produced no content", role);
                DuetError::EmptyStream
            }
            Err(e) => {
                tracing::warn!("[Orchestrator] Role {} stream failed: {}", role, e);
                e
            }
        };
        renderer.abort();

        if !stream_error.triggers_fallback() {
            let marker = role.failure_marker();
            MarkdownRenderer::new(&mut *target).fail(&marker);
            return RoleOutcome {
                role,
                text: String::new(),
                source: ReplySource::Failed,
                stream_error: Some(stream_error),
                fallback_error: None,
            };
        }

        target.set_status(RenderStatus::Thinking);
        let fallback = self
            .registry
            .gateway()
            .complete(provider, &request.without_streaming())
            .await;
        let mut renderer = MarkdownRenderer::new(&mut *target);
        match fallback {
            Ok(text) if !text.trim().is_empty() => {
                tracing::info!("[Orchestrator] Role {} recovered via fallback", role);
                renderer.write(&text);
                renderer.end();
                RoleOutcome {
                    role,
                    text,
                    source: ReplySource::Fallback,
                    stream_error: Some(stream_error),
                    fallback_error: None,
                }
            }
            outcome => {
                let error = match outcome {
                    Ok(_) => DuetError::fallback("empty response"),
                    Err(e) => DuetError::fallback(e.to_string()),
                };
                tracing::error!("[Orchestrator] Role {} failed: {}", role, error);
                renderer.fail(&role.failure_marker());
                RoleOutcome {
                    role,
                    text: String::new(),
                    source: ReplySource::Failed,
                    stream_error: Some(stream_error),
                    fallback_error: Some(error),
                }
            }
        }
    }

    /// Streams deltas into `renderer` and returns the concatenated text.
    async fn stream_into(
        &self,
        provider: &str,
        request: &CompletionRequest,
        renderer: &mut MarkdownRenderer<'_>,
    ) -> Result<String> {
        let mut stream = self.registry.gateway().stream(provider, request).await?;
        let mut text = String::new();
        while let Some(delta) = stream.next().await {
            let delta = delta?;
            if delta.is_empty() {
                continue;
            }
            renderer.write(&delta);
            text.push_str(&delta);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tracing_subscriber::layer::SubscriberExt;

    use super::*;
    use crate::markdown::HtmlTarget;
    use crate::notification_layer::NotificationLayer;
    use crate::test_support::{MemoryExchangeRepository, MockGateway, StreamScript};

    struct Fixture {
        gateway: Arc<MockGateway>,
        history: Arc<MemoryExchangeRepository>,
        orchestrator: DualCompletionOrchestrator,
    }

    fn fixture(gateway: MockGateway) -> Fixture {
        let gateway = Arc::new(gateway);
        let history = Arc::new(MemoryExchangeRepository::default());
        let registry = Arc::new(ProviderRegistry::new(gateway.clone(), "tongyi"));
        let orchestrator = DualCompletionOrchestrator::new(registry, history.clone(), 10);
        Fixture {
            gateway,
            history,
            orchestrator,
        }
    }

    async fn submit(fixture: &Fixture, input: &str) -> (Result<SubmitOutcome>, HtmlTarget, HtmlTarget) {
        let mut a = HtmlTarget::new();
        let mut b = HtmlTarget::new();
        let outcome = fixture
            .orchestrator
            .submit(input, &RolePrompts::default(), &[], &mut a, &mut b)
            .await;
        (outcome, a, b)
    }

    #[tokio::test]
    async fn test_both_roles_stream_into_one_exchange() {
        let fixture = fixture(MockGateway::new());
        let (outcome, a, b) = submit(&fixture, "I are go to school yesterday").await;
        let outcome = outcome.unwrap();

        assert_eq!(outcome.exchange.reply_a, "Oh, how was school?");
        assert_eq!(outcome.exchange.reply_b, "I went to school yesterday.");
        assert_eq!(outcome.role_a.source, ReplySource::Stream);
        assert!(outcome.appended);
        assert_eq!(a.html(), "<p>Oh, how was school?</p>");
        assert_eq!(b.html(), "<p>I went to school yesterday.</p>");
        assert_eq!(a.status(), Some(RenderStatus::Done));

        let saved = fixture.history.exchanges.lock().unwrap().clone();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].user_input, "I are go to school yesterday");
    }

    #[tokio::test]
    async fn test_empty_stream_uses_exactly_one_fallback() {
        let fixture = fixture(MockGateway::new().with_stream(RoleId::B, StreamScript::Deltas(vec![])));
        let (outcome, _, b) = submit(&fixture, "hello").await;
        let outcome = outcome.unwrap();

        assert_eq!(outcome.role_b.source, ReplySource::Fallback);
        assert_eq!(outcome.exchange.reply_b, "Fallback B");
        assert!(matches!(outcome.role_b.stream_error, Some(DuetError::EmptyStream)));
        assert_eq!(fixture.gateway.fallback_calls(RoleId::B), 1);
        assert_eq!(fixture.gateway.fallback_calls(RoleId::A), 0);
        assert_eq!(b.html(), "<p>Fallback B</p>");
    }

    #[tokio::test]
    async fn test_empty_stream_fallback_is_not_notified() {
        let (layer, mut notifications) = NotificationLayer::channel();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(layer));

        let fixture = fixture(MockGateway::new().with_stream(RoleId::A, StreamScript::Deltas(vec![])));
        let (outcome, _, _) = submit(&fixture, "hello").await;

        assert_eq!(outcome.unwrap().role_a.source, ReplySource::Fallback);
        assert!(notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broken_stream_discards_partial_output() {
        let fixture = fixture(
            MockGateway::new().with_stream(RoleId::A, StreamScript::FailAfter(vec!["Oh, how"])),
        );
        let (outcome, a, _) = submit(&fixture, "hello").await;
        let outcome = outcome.unwrap();

        assert_eq!(outcome.role_a.source, ReplySource::Fallback);
        assert_eq!(outcome.exchange.reply_a, "Fallback A");
        assert_eq!(a.html(), "<p>Fallback A</p>");
    }

    #[tokio::test]
    async fn test_failed_role_renders_marker_and_other_role_survives() {
        let fixture = fixture(
            MockGateway::new()
                .with_stream(RoleId::A, StreamScript::Refuse)
                .with_fallback(RoleId::A, Err("upstream timeout")),
        );
        let (outcome, a, b) = submit(&fixture, "hello").await;
        let outcome = outcome.unwrap();

        assert_eq!(outcome.role_a.source, ReplySource::Failed);
        assert_eq!(outcome.exchange.reply_a, "");
        assert!(outcome.role_a.fallback_error.is_some());
        assert_eq!(a.html(), format!("<p>{}</p>", RoleId::A.failure_marker()));
        assert_eq!(a.status(), Some(RenderStatus::Failed));

        assert_eq!(outcome.exchange.reply_b, "I went to school yesterday.");
        assert_eq!(b.status(), Some(RenderStatus::Done));
        assert!(outcome.appended);
    }

    #[tokio::test]
    async fn test_exchange_with_no_replies_is_not_recorded() {
        let fixture = fixture(
            MockGateway::new()
                .with_stream(RoleId::A, StreamScript::Refuse)
                .with_stream(RoleId::B, StreamScript::Deltas(vec![]))
                .with_fallback(RoleId::A, Err("down"))
                .with_fallback(RoleId::B, Ok("  ")),
        );
        let (outcome, a, b) = submit(&fixture, "hello").await;
        let outcome = outcome.unwrap();

        assert!(!outcome.appended);
        assert!(fixture.history.exchanges.lock().unwrap().is_empty());
        assert_eq!(a.status(), Some(RenderStatus::Failed));
        assert_eq!(b.status(), Some(RenderStatus::Failed));
    }

    #[tokio::test]
    async fn test_rejects_blank_input_and_unavailable_provider() {
        let fixture = fixture(MockGateway::new());
        let (outcome, _, _) = submit(&fixture, "   \n").await;
        assert!(matches!(outcome, Err(DuetError::InvalidInput(_))));
        assert!(fixture.gateway.requests().is_empty());

        fixture.orchestrator.registry.select("deepseek").await.unwrap();
        let (outcome, _, _) = submit(&fixture, "hello").await;
        assert!(outcome.unwrap_err().is_config_unavailable());
        assert!(fixture.gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_second_submission_while_in_flight_is_busy() {
        let fixture = fixture(MockGateway::new().with_delay(Duration::from_millis(200)));

        let (first, second) = tokio::join!(submit(&fixture, "first"), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            submit(&fixture, "second").await
        });

        assert!(first.0.is_ok());
        assert!(matches!(second.0, Err(DuetError::Busy(_))));
    }

    #[tokio::test]
    async fn test_request_carries_role_history() {
        let fixture = fixture(MockGateway::new());
        let history: Vec<ConversationExchange> = (0..12)
            .map(|i| ConversationExchange::new(format!("q{i}"), format!("a{i}"), format!("b{i}")))
            .collect();
        let mut a = HtmlTarget::new();
        let mut b = HtmlTarget::new();
        fixture
            .orchestrator
            .submit("next", &RolePrompts::default(), &history, &mut a, &mut b)
            .await
            .unwrap();

        let requests = fixture.gateway.requests();
        let request_b = requests.iter().find(|r| r.role_id == RoleId::B).unwrap();
        assert_eq!(request_b.history_pairs(), 10);
        assert_eq!(request_b.messages[1].content, "q2");
        assert_eq!(request_b.messages[2].content, "b2");
        assert_eq!(request_b.messages.last().unwrap().content, "next");
    }
}
