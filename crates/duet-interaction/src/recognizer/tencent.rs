//! Tencent Cloud realtime ASR over WebSocket.

use std::time::Duration;

use async_trait::async_trait;
use duet_core::error::{DuetError, Result};
use duet_core::speech::{Credentials, RecognitionParams};
use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde::Deserialize;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::{LinkCommand, LinkPeer, RecognitionLink, Recognizer, RecognizerEvent};
use crate::credential_provider::hmac_sha1_base64;

const ASR_PATH: &str = "/asr/v2";
const END_MESSAGE: &str = r#"{"type":"end"}"#;
/// Signed URLs stay valid for one day.
const SIGNATURE_LIFETIME_SECS: i64 = 24 * 60 * 60;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Realtime recognizer for `wss://asr.cloud.tencent.com/asr/v2/<appid>`.
#[derive(Debug, Clone)]
pub struct TencentRecognizer {
    host: String,
    connect_timeout: Duration,
}

impl TencentRecognizer {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Bounds the WebSocket handshake.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builds the signed connection URL.
    ///
    /// The signature is HMAC-SHA1 over `host/path?query` with the query
    /// parameters sorted by name and left unencoded.
    pub fn build_url(
        &self,
        credentials: &Credentials,
        params: &RecognitionParams,
        voice_id: &str,
        nonce: u32,
        timestamp: i64,
    ) -> Result<Url> {
        let mut query: Vec<(&str, String)> = vec![
            ("secretid", credentials.id.clone()),
            ("timestamp", timestamp.to_string()),
            ("expired", (timestamp + SIGNATURE_LIFETIME_SECS).to_string()),
            ("nonce", nonce.to_string()),
            ("voice_id", voice_id.to_string()),
        ];
        if !credentials.token.is_empty() {
            query.push(("token", credentials.token.clone()));
        }
        query.extend(params.query_pairs());
        query.sort_by(|a, b| a.0.cmp(b.0));

        let path = format!("{}/{}", ASR_PATH, credentials.app_id);
        let raw_query = query
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature = hmac_sha1_base64(&credentials.secret, &format!("{}{}?{}", self.host, path, raw_query))?;

        let mut url = Url::parse(&format!("wss://{}{}", self.host, path))
            .map_err(|e| DuetError::recognition(format!("Invalid recognition endpoint: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &query {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("signature", &signature);
        }
        Ok(url)
    }
}

#[async_trait]
impl Recognizer for TencentRecognizer {
    async fn connect(
        &self,
        credentials: &Credentials,
        params: &RecognitionParams,
    ) -> Result<RecognitionLink> {
        let voice_id = uuid::Uuid::new_v4().simple().to_string();
        let nonce = rand::thread_rng().gen_range(1..=u32::MAX / 2);
        let timestamp = chrono::Utc::now().timestamp();
        let url = self.build_url(credentials, params, &voice_id, nonce, timestamp)?;

        tracing::info!("[Recognizer] Connecting voice_id={}", voice_id);
        let (ws_stream, _) = match tokio::time::timeout(self.connect_timeout, connect_async(url.as_str())).await {
            Ok(connected) => connected
                .map_err(|e| DuetError::recognition(format!("WebSocket connect failed: {e}")))?,
            Err(_) => {
                return Err(DuetError::recognition(format!(
                    "WebSocket connect timed out after {:?}",
                    self.connect_timeout
                )));
            }
        };
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let (mut link, peer) = RecognitionLink::pair();
        let LinkPeer {
            mut commands,
            events,
        } = peer;

        // Task: forward audio and control to the socket.
        let writer_events = events.clone();
        link.attach(tokio::spawn(async move {
            while let Some(command) = commands.recv().await {
                let message = match command {
                    LinkCommand::Audio(frame) => Message::Binary(frame.into()),
                    LinkCommand::Finish => Message::Text(END_MESSAGE.into()),
                };
                if let Err(e) = ws_tx.send(message).await {
                    let _ = writer_events
                        .send(RecognizerEvent::Error(format!("Failed to send audio: {e}")))
                        .await;
                    return;
                }
            }
            let _ = ws_tx.close().await;
        }));

        // Task: translate server messages into events.
        link.attach(tokio::spawn(async move {
            let mut started = false;
            while let Some(message) = ws_rx.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let parsed = match serde_json::from_str::<ServerMessage>(text.as_str()) {
                            Ok(parsed) => parsed,
                            Err(e) => {
                                tracing::debug!("[Recognizer] Ignoring unparseable message: {}", e);
                                continue;
                            }
                        };
                        let (batch, finished) = interpret(&parsed, &mut started);
                        for event in batch {
                            if events.send(event).await.is_err() {
                                return;
                            }
                        }
                        if finished {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::debug!("[Recognizer] Server closed connection: {:?}", frame);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = events
                            .send(RecognizerEvent::Error(format!("WebSocket error: {e}")))
                            .await;
                        return;
                    }
                }
            }
            let _ = events.send(RecognizerEvent::Closed).await;
        }));

        Ok(link)
    }
}

#[derive(Debug, Deserialize)]
struct ServerMessage {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    voice_id: Option<String>,
    #[serde(default)]
    result: Option<SliceResult>,
    #[serde(default, rename = "final")]
    is_final: i64,
}

#[derive(Debug, Deserialize)]
struct SliceResult {
    /// 0 = sentence begin, 1 = in progress, 2 = sentence end
    slice_type: u8,
    #[serde(default)]
    voice_text_str: String,
    #[serde(default)]
    word_confidence: Option<f32>,
}

/// Maps one server message to events; the flag tells whether the stream is
/// over.
fn interpret(message: &ServerMessage, started: &mut bool) -> (Vec<RecognizerEvent>, bool) {
    if message.code != 0 {
        let text = format!("Recognition failed ({}): {}", message.code, message.message);
        return (vec![RecognizerEvent::Error(text)], true);
    }

    let mut events = Vec::new();
    if !*started {
        *started = true;
        events.push(RecognizerEvent::Started {
            voice_id: message.voice_id.clone().unwrap_or_default(),
        });
    }

    if let Some(result) = &message.result {
        let text = result.voice_text_str.clone();
        let confidence = result.word_confidence;
        match result.slice_type {
            0 => {
                events.push(RecognizerEvent::SentenceBegin);
                if !text.is_empty() {
                    events.push(RecognizerEvent::ResultChange { text, confidence });
                }
            }
            2 => events.push(RecognizerEvent::SentenceEnd { text, confidence }),
            _ => events.push(RecognizerEvent::ResultChange { text, confidence }),
        }
    }

    if message.is_final == 1 {
        events.push(RecognizerEvent::Complete { text: None });
        return (events, true);
    }
    (events, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            id: "AKIDtest".to_string(),
            secret: "secret-key".to_string(),
            token: "tok+en/=".to_string(),
            app_id: "1259228442".to_string(),
            expires_at_ms: 0,
            region: None,
        }
    }

    fn message(json: &str) -> ServerMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_url_is_signed_over_sorted_raw_query() {
        let recognizer = TencentRecognizer::new("asr.cloud.tencent.com");
        let url = recognizer
            .build_url(&credentials(), &RecognitionParams::default(), "vid", 42, 1_700_000_000)
            .unwrap();

        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/asr/v2/1259228442");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let (last_key, signature) = pairs.last().unwrap().clone();
        assert_eq!(last_key, "signature");

        let keys: Vec<&str> = pairs[..pairs.len() - 1].iter().map(|(k, _)| k.as_str()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(keys.contains(&"token"));
        assert!(keys.contains(&"engine_model_type"));

        let raw_query = pairs[..pairs.len() - 1]
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let expected = hmac_sha1_base64(
            "secret-key",
            &format!("asr.cloud.tencent.com/asr/v2/1259228442?{raw_query}"),
        )
        .unwrap();
        assert_eq!(signature, expected);
    }

    #[tokio::test]
    async fn test_stalled_handshake_times_out() {
        // Accepts the TCP connection but never answers the TLS handshake.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let recognizer = TencentRecognizer::new(host).with_connect_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = match recognizer.connect(&credentials(), &RecognitionParams::default()).await {
            Ok(_) => panic!("connect should time out"),
            Err(err) => err,
        };

        assert!(err.is_recognition());
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(3));
        server.abort();
    }

    #[test]
    fn test_handshake_then_slices() {
        let mut started = false;

        let (events, done) = interpret(
            &message(r#"{"code":0,"message":"success","voice_id":"vid"}"#),
            &mut started,
        );
        assert_eq!(events, vec![RecognizerEvent::Started { voice_id: "vid".to_string() }]);
        assert!(!done);

        let (events, _) = interpret(
            &message(r#"{"code":0,"voice_id":"vid","result":{"slice_type":1,"voice_text_str":"Hello"}}"#),
            &mut started,
        );
        assert_eq!(
            events,
            vec![RecognizerEvent::ResultChange { text: "Hello".to_string(), confidence: None }]
        );

        let (events, _) = interpret(
            &message(r#"{"code":0,"result":{"slice_type":2,"voice_text_str":"Hello.","word_confidence":0.9}}"#),
            &mut started,
        );
        assert_eq!(
            events,
            vec![RecognizerEvent::SentenceEnd { text: "Hello.".to_string(), confidence: Some(0.9) }]
        );

        let (events, done) = interpret(&message(r#"{"code":0,"final":1}"#), &mut started);
        assert_eq!(events, vec![RecognizerEvent::Complete { text: None }]);
        assert!(done);
    }

    #[test]
    fn test_error_code_ends_stream() {
        let mut started = false;
        let (events, done) = interpret(
            &message(r#"{"code":4002,"message":"signature mismatch"}"#),
            &mut started,
        );

        assert!(done);
        assert!(matches!(&events[0], RecognizerEvent::Error(text) if text.contains("4002")));
    }
}
