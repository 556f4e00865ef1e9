//! Hand-written collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use duet_core::error::{DuetError, Result};
use duet_core::exchange::{CompletionRequest, ConversationExchange, ExchangeRepository};
use duet_core::prompt::{PromptRepository, RoleId, RolePrompt, RolePrompts};
use duet_core::provider::{GatewayHealth, ProviderInfo, ProviderMap};
use duet_core::speech::{CredentialGrant, Credentials, RecognitionParams};
use duet_interaction::recognizer::{LinkCommand, LinkPeer};
use duet_interaction::{
    AudioCapture, AudioSource, CompletionGateway, CompletionStream, CredentialSource,
    RecognitionLink, Recognizer, RecognizerEvent,
};

/// How the gateway answers a streaming request for one role.
#[derive(Debug, Clone)]
pub enum StreamScript {
    Deltas(Vec<&'static str>),
    /// Yields the deltas, then breaks with a transport error
    FailAfter(Vec<&'static str>),
    /// The request itself is answered with HTTP 500
    Refuse,
}

pub struct MockGateway {
    streams: Mutex<HashMap<RoleId, StreamScript>>,
    fallbacks: Mutex<HashMap<RoleId, std::result::Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    provider_calls: AtomicUsize,
    delay: Duration,
}

impl MockGateway {
    pub fn new() -> Self {
        let streams = HashMap::from([
            (RoleId::A, StreamScript::Deltas(vec!["Oh, how was ", "school?"])),
            (RoleId::B, StreamScript::Deltas(vec!["I went to school ", "yesterday."])),
        ]);
        let fallbacks = HashMap::from([
            (RoleId::A, Ok("Fallback A".to_string())),
            (RoleId::B, Ok("Fallback B".to_string())),
        ]);
        Self {
            streams: Mutex::new(streams),
            fallbacks: Mutex::new(fallbacks),
            requests: Mutex::new(Vec::new()),
            provider_calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_stream(self, role: RoleId, script: StreamScript) -> Self {
        self.streams.lock().unwrap().insert(role, script);
        self
    }

    pub fn with_fallback(self, role: RoleId, result: std::result::Result<&str, &str>) -> Self {
        let result = result.map(str::to_string).map_err(str::to_string);
        self.fallbacks.lock().unwrap().insert(role, result);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of non-streaming calls made for `role`.
    pub fn fallback_calls(&self, role: RoleId) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.role_id == role && !r.streaming)
            .count()
    }

    pub fn provider_calls(&self) -> usize {
        self.provider_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionGateway for MockGateway {
    async fn stream(&self, _provider: &str, request: &CompletionRequest) -> Result<CompletionStream> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let script = self.streams.lock().unwrap()[&request.role_id].clone();
        let items: Vec<Result<String>> = match script {
            StreamScript::Deltas(deltas) => deltas.into_iter().map(|d| Ok(d.to_string())).collect(),
            StreamScript::FailAfter(deltas) => deltas
                .into_iter()
                .map(|d| Ok(d.to_string()))
                .chain([Err(DuetError::transport(None, "connection reset"))])
                .collect(),
            StreamScript::Refuse => {
                return Err(DuetError::transport(Some(500), "API key not configured"));
            }
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn complete(&self, _provider: &str, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.fallbacks.lock().unwrap()[&request.role_id]
            .clone()
            .map_err(|message| DuetError::transport(Some(502), message))
    }

    async fn providers(&self) -> Result<ProviderMap> {
        self.provider_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderMap::from([
            (
                "tongyi".to_string(),
                ProviderInfo {
                    name: "Tongyi Qianwen".to_string(),
                    model: Some("qwen-turbo".to_string()),
                    available: true,
                },
            ),
            (
                "deepseek".to_string(),
                ProviderInfo {
                    name: "DeepSeek".to_string(),
                    model: Some("deepseek-chat".to_string()),
                    available: false,
                },
            ),
        ]))
    }

    async fn health(&self) -> Result<GatewayHealth> {
        Ok(GatewayHealth {
            status: "healthy".to_string(),
            message: None,
            providers: vec!["tongyi".to_string(), "deepseek".to_string()],
        })
    }
}

#[derive(Default)]
pub struct MemoryExchangeRepository {
    pub exchanges: Mutex<Vec<ConversationExchange>>,
}

#[async_trait]
impl ExchangeRepository for MemoryExchangeRepository {
    async fn load_all(&self) -> Result<Vec<ConversationExchange>> {
        Ok(self.exchanges.lock().unwrap().clone())
    }

    async fn append(&self, exchange: &ConversationExchange) -> Result<()> {
        self.exchanges.lock().unwrap().push(exchange.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.exchanges.lock().unwrap().clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPromptRepository {
    pub prompts: Mutex<RolePrompts>,
}

#[async_trait]
impl PromptRepository for MemoryPromptRepository {
    async fn load(&self) -> Result<RolePrompts> {
        Ok(self.prompts.lock().unwrap().clone())
    }

    async fn save(&self, prompt: &RolePrompt) -> Result<()> {
        self.prompts.lock().unwrap().set(prompt.clone());
        Ok(())
    }

    async fn reset(&self, role: RoleId) -> Result<()> {
        self.prompts.lock().unwrap().set(RolePrompt::default_for(role));
        Ok(())
    }
}

/// Issues credentials valid for an hour; fails the first `failures` fetches.
pub struct MockCredentialSource {
    failures: AtomicUsize,
}

impl MockCredentialSource {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl CredentialSource for MockCredentialSource {
    async fn fetch(&self) -> Result<CredentialGrant> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DuetError::auth("trust server returned 503"));
        }
        Ok(CredentialGrant {
            credentials: Credentials {
                id: "AKIDtest".to_string(),
                secret: "secret".to_string(),
                token: "token".to_string(),
                app_id: "1250000000".to_string(),
                expires_at_ms: chrono::Utc::now().timestamp_millis() + 3_600_000,
                region: None,
            },
            session_id: Some("sts-1".to_string()),
        })
    }

    async fn refresh(&self, _session_id: Option<&str>) -> Result<CredentialGrant> {
        self.fetch().await
    }
}

/// Acknowledges every connection, replays `script` right away and
/// `on_finish` once the session signals the end of audio.
#[derive(Clone, Default)]
pub struct MockRecognizer {
    pub script: Vec<RecognizerEvent>,
    pub on_finish: Vec<RecognizerEvent>,
    pub frames: Arc<AtomicUsize>,
    /// Never acknowledge the connection and stay silent
    pub mute: bool,
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn connect(
        &self,
        _credentials: &Credentials,
        _params: &RecognitionParams,
    ) -> Result<RecognitionLink> {
        let (mut link, peer) = RecognitionLink::pair();
        let LinkPeer {
            mut commands,
            events,
        } = peer;
        let script = self.script.clone();
        let on_finish = self.on_finish.clone();
        let frames = self.frames.clone();
        let mute = self.mute;

        link.attach(tokio::spawn(async move {
            if mute {
                while commands.recv().await.is_some() {}
                return;
            }
            let started = RecognizerEvent::Started {
                voice_id: "voice-1".to_string(),
            };
            for event in std::iter::once(started).chain(script) {
                if events.send(event).await.is_err() {
                    return;
                }
            }
            while let Some(command) = commands.recv().await {
                match command {
                    LinkCommand::Audio(_) => {
                        frames.fetch_add(1, Ordering::SeqCst);
                    }
                    LinkCommand::Finish => {
                        for event in on_finish {
                            let _ = events.send(event).await;
                        }
                        return;
                    }
                }
            }
        }));
        Ok(link)
    }
}

/// A recognizer whose connection attempt never completes.
pub struct StalledRecognizer;

#[async_trait]
impl Recognizer for StalledRecognizer {
    async fn connect(
        &self,
        _credentials: &Credentials,
        _params: &RecognitionParams,
    ) -> Result<RecognitionLink> {
        std::future::pending().await
    }
}

/// Emits `frames` silent frames; with `keep_open` the capture then idles
/// until stopped instead of ending.
pub struct ScriptedAudio {
    pub frames: usize,
    pub keep_open: bool,
}

#[async_trait]
impl AudioSource for ScriptedAudio {
    async fn start(&self) -> Result<AudioCapture> {
        let (capture, mut feed) = AudioCapture::pair();
        let frames = self.frames;
        let keep_open = self.keep_open;
        tokio::spawn(async move {
            for _ in 0..frames {
                if !feed.send(vec![0u8; 1280]).await {
                    return;
                }
            }
            if keep_open {
                feed.stopped().await;
            }
        });
        Ok(capture)
    }

    fn describe(&self) -> String {
        "scripted audio".to_string()
    }
}
