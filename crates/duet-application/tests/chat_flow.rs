use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use duet_application::{ChatService, HtmlTarget, RenderStatus, ReplySource};
use duet_core::error::{DuetError, Result};
use duet_core::exchange::CompletionRequest;
use duet_core::prompt::RoleId;
use duet_core::provider::{GatewayHealth, ProviderInfo, ProviderMap};
use duet_infrastructure::{DuetPaths, JsonExchangeRepository, TomlPromptRepository};
use duet_interaction::{CompletionGateway, CompletionStream};
use tempfile::TempDir;

/// Answers role A conversationally and role B with the corrected sentence.
/// Role B's stream comes back empty so its reply arrives via the fallback.
#[derive(Default)]
struct TutorGateway {
    requests: Mutex<Vec<CompletionRequest>>,
}

impl TutorGateway {
    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionGateway for TutorGateway {
    async fn stream(&self, _provider: &str, request: &CompletionRequest) -> Result<CompletionStream> {
        self.requests.lock().unwrap().push(request.clone());
        let deltas: Vec<Result<String>> = match request.role_id {
            RoleId::A => vec![Ok("Oh, **how** was ".to_string()), Ok("school?".to_string())],
            RoleId::B => vec![],
        };
        Ok(Box::pin(futures::stream::iter(deltas)))
    }

    async fn complete(&self, _provider: &str, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        match request.role_id {
            RoleId::B => Ok("I went to school yesterday.".to_string()),
            RoleId::A => Err(DuetError::transport(Some(500), "unexpected fallback")),
        }
    }

    async fn providers(&self) -> Result<ProviderMap> {
        Ok(ProviderMap::from([(
            "tongyi".to_string(),
            ProviderInfo {
                name: "Tongyi Qianwen".to_string(),
                model: None,
                available: true,
            },
        )]))
    }

    async fn health(&self) -> Result<GatewayHealth> {
        Ok(GatewayHealth {
            status: "healthy".to_string(),
            message: None,
            providers: vec!["tongyi".to_string()],
        })
    }
}

fn service(paths: &DuetPaths, gateway: Arc<TutorGateway>) -> ChatService {
    ChatService::new(
        gateway,
        Arc::new(TomlPromptRepository::new(paths)),
        Arc::new(JsonExchangeRepository::new(paths)),
        "tongyi",
        10,
    )
}

#[tokio::test]
async fn grammar_scenario_is_recorded_and_replayed() {
    let root = TempDir::new().unwrap();
    let paths = DuetPaths::with_root(root.path());
    let gateway = Arc::new(TutorGateway::default());
    let chat = service(&paths, gateway.clone());
    assert!(chat.load().await.unwrap().is_empty());

    let mut a = HtmlTarget::new();
    let mut b = HtmlTarget::new();
    let outcome = chat
        .submit("I are go to school yesterday", &mut a, &mut b)
        .await
        .unwrap();

    assert_eq!(outcome.exchange.reply_a, "Oh, **how** was school?");
    assert_eq!(outcome.exchange.reply_b, "I went to school yesterday.");
    assert_eq!(outcome.role_b.source, ReplySource::Fallback);
    assert_eq!(a.html(), "<p>Oh, <strong>how</strong> was school?</p>");
    assert_eq!(b.html(), "<p>I went to school yesterday.</p>");
    assert_eq!(b.status(), Some(RenderStatus::Done));

    // A fresh service over the same files sees the exchange.
    let reopened = service(&paths, gateway.clone());
    let replayed = reopened.load().await.unwrap();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].user_input, "I are go to school yesterday");

    // The next request for role B carries only B's side of the history.
    let mut a = HtmlTarget::new();
    let mut b = HtmlTarget::new();
    reopened.submit("She don't like it", &mut a, &mut b).await.unwrap();
    let last_b = gateway
        .requests()
        .into_iter()
        .filter(|r| r.role_id == RoleId::B && r.streaming)
        .last()
        .unwrap();
    assert_eq!(last_b.history_pairs(), 1);
    assert_eq!(last_b.messages[2].content, "I went to school yesterday.");
    assert_eq!(reopened.history().await.len(), 2);
}

#[tokio::test]
async fn edited_prompt_is_used_and_survives_clear() {
    let root = TempDir::new().unwrap();
    let paths = DuetPaths::with_root(root.path());
    let gateway = Arc::new(TutorGateway::default());
    let chat = service(&paths, gateway.clone());

    chat.set_prompt(RoleId::A, "You are a friendly barista.").await.unwrap();
    let mut a = HtmlTarget::new();
    let mut b = HtmlTarget::new();
    chat.submit("One latte please", &mut a, &mut b).await.unwrap();

    let first_a = gateway
        .requests()
        .into_iter()
        .find(|r| r.role_id == RoleId::A)
        .unwrap();
    assert_eq!(first_a.messages[0].content, "You are a friendly barista.");

    chat.clear_history().await.unwrap();
    assert!(chat.history().await.is_empty());
    assert!(chat.load().await.unwrap().is_empty());
    assert_eq!(
        chat.prompts().await.unwrap().a.system_text,
        "You are a friendly barista."
    );

    chat.reset_prompt(RoleId::A).await.unwrap();
    assert_eq!(
        chat.prompts().await.unwrap().a.system_text,
        RoleId::A.default_prompt()
    );
}

#[tokio::test]
async fn provider_selection_and_health() {
    let root = TempDir::new().unwrap();
    let chat = service(&DuetPaths::with_root(root.path()), Arc::new(TutorGateway::default()));

    assert!(chat.health().await.unwrap().is_healthy());
    assert!(chat.providers().await.unwrap().contains_key("tongyi"));
    assert!(chat.select_provider("deepseek").await.unwrap_err().is_not_found());
    assert_eq!(chat.provider(), "tongyi");
}
