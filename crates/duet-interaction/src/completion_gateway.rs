//! Completion gateway client.
//!
//! Talks to the gateway proxy that fronts the language-model providers:
//! `POST /completions` (streaming or not), `GET /providers` and `GET /health`.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use duet_core::config::GatewayConfig;
use duet_core::error::{DuetError, Result};
use duet_core::exchange::{ChatMessage, CompletionRequest};
use duet_core::provider::{GatewayHealth, ProviderMap};
use futures::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::sse::{SseDecoder, SseEvent};

/// Stream of non-empty text deltas for one reply.
///
/// Ends after `[DONE]` or when the body closes. A transport failure is
/// yielded as a single `Err` and terminates the stream.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Access to chat completions and provider discovery.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Opens a streaming completion.
    async fn stream(&self, provider: &str, request: &CompletionRequest) -> Result<CompletionStream>;

    /// Performs a non-streaming completion and returns the full text.
    async fn complete(&self, provider: &str, request: &CompletionRequest) -> Result<String>;

    /// Lists the providers the gateway knows about.
    async fn providers(&self) -> Result<ProviderMap>;

    /// Checks that the gateway is up.
    async fn health(&self) -> Result<GatewayHealth>;
}

/// Gateway implementation over HTTP.
#[derive(Clone)]
pub struct HttpCompletionGateway {
    client: Client,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    request_timeout: Duration,
    stream_idle_timeout: Duration,
}

impl HttpCompletionGateway {
    /// Creates a client from the gateway section of the configuration.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| DuetError::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            stream_idle_timeout: Duration::from_secs(config.stream_idle_timeout_secs),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn body<'a>(&self, provider: &'a str, request: &'a CompletionRequest, stream: bool) -> CompletionBody<'a> {
        CompletionBody {
            provider,
            messages: &request.messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        }
    }

    async fn post_completion(
        &self,
        provider: &str,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let send = self
            .client
            .post(self.endpoint("completions"))
            .header("content-type", "application/json")
            .json(&self.body(provider, request, stream))
            .send();

        // Streaming bodies are bounded per chunk instead of overall.
        let response = tokio::time::timeout(self.request_timeout, send)
            .await
            .map_err(|_| {
                DuetError::transport(
                    None,
                    format!("Gateway did not respond within {:?}", self.request_timeout),
                )
            })?
            .map_err(|err| DuetError::transport(None, format!("Gateway request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read gateway error body".to_string());
            return Err(map_http_error(status, body_text));
        }

        Ok(response)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.endpoint(path))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|err| DuetError::config_unavailable(format!("Gateway unreachable: {err}")))?;

        if !response.status().is_success() {
            return Err(DuetError::config_unavailable(format!(
                "GET /{} returned {}",
                path,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|err| DuetError::config_unavailable(format!("Invalid /{path} response: {err}")))
    }
}

#[async_trait]
impl CompletionGateway for HttpCompletionGateway {
    async fn stream(&self, provider: &str, request: &CompletionRequest) -> Result<CompletionStream> {
        let response = self.post_completion(provider, request, true).await?;
        tracing::debug!(
            "[Gateway] Stream opened for role {} ({} messages)",
            request.role_id,
            request.messages.len()
        );

        let state = DeltaStream {
            body: response.bytes_stream().boxed(),
            decoder: SseDecoder::new(),
            queued: VecDeque::new(),
            idle_timeout: self.stream_idle_timeout,
            body_finished: false,
        };
        Ok(Box::pin(futures::stream::unfold(state, DeltaStream::next_delta)))
    }

    async fn complete(&self, provider: &str, request: &CompletionRequest) -> Result<String> {
        let request = request.without_streaming();
        let response = self.post_completion(provider, &request, false).await?;

        let body_text = tokio::time::timeout(self.request_timeout, response.text())
            .await
            .map_err(|_| DuetError::transport(None, "Timed out reading gateway response"))?
            .map_err(|err| DuetError::transport(None, format!("Failed to read response: {err}")))?;

        let parsed: CompletionResponse = serde_json::from_str(&body_text).map_err(|err| {
            DuetError::transport(None, format!("Failed to parse gateway response: {err}"))
        })?;
        extract_text_response(parsed)
    }

    async fn providers(&self) -> Result<ProviderMap> {
        self.get_json("providers").await
    }

    async fn health(&self) -> Result<GatewayHealth> {
        self.get_json("health").await
    }
}

/// State threaded through `futures::stream::unfold`.
struct DeltaStream {
    body: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    decoder: SseDecoder,
    queued: VecDeque<SseEvent>,
    idle_timeout: Duration,
    body_finished: bool,
}

impl DeltaStream {
    async fn next_delta(mut self) -> Option<(Result<String>, Self)> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                match event {
                    SseEvent::Delta(text) => return Some((Ok(text), self)),
                    SseEvent::Done => {
                        self.finish();
                        return None;
                    }
                    SseEvent::Error(message) => {
                        self.finish();
                        return Some((Err(DuetError::transport(None, message)), self));
                    }
                }
            }

            if self.body_finished {
                return None;
            }

            match tokio::time::timeout(self.idle_timeout, self.body.next()).await {
                Err(_) => {
                    self.finish();
                    let message = format!("No data for {:?}", self.idle_timeout);
                    return Some((Err(DuetError::transport(None, message)), self));
                }
                Ok(Some(Ok(chunk))) => {
                    let events = self.decoder.push(&chunk);
                    self.queued.extend(events);
                }
                Ok(Some(Err(err))) => {
                    self.finish();
                    let message = format!("Stream interrupted: {err}");
                    return Some((Err(DuetError::transport(None, message)), self));
                }
                Ok(None) => {
                    let events = self.decoder.finish();
                    self.queued.extend(events);
                    self.body_finished = true;
                    if self.decoder.skipped() > 0 {
                        tracing::debug!(
                            "[Gateway] Stream ended; {} malformed frames skipped",
                            self.decoder.skipped()
                        );
                    }
                }
            }
        }
    }

    fn finish(&mut self) {
        self.queued.clear();
        self.body_finished = true;
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    provider: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: serde_json::Value,
}

fn extract_text_response(response: CompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| DuetError::transport(None, "Gateway returned no content in the response"))
}

fn map_http_error(status: StatusCode, body: String) -> DuetError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| match wrapper.error {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        })
        .unwrap_or(body);

    DuetError::transport(Some(status.as_u16()), format!("HTTP {}: {}", status.as_u16(), message))
}
