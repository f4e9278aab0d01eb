//! Ollama `/api/chat` completion client.
//!
//! Sends `{model, messages, stream: false}` and reads the answer from
//! `message.content`. Every outcome maps onto the client contract:
//! - answer present → `Reply`
//! - answer field absent or blank → `Reply` with the configured fallback phrase
//! - no answer within the bound → `CompletionError::Timeout`
//! - connect/DNS failure or non-2xx → `CompletionError::Unreachable`
//! - body that is not the expected JSON shape → `CompletionError::MalformedResponse`
//!
//! One request per call. Retrying is the caller's decision.

use async_trait::async_trait;
use convorelay_config::RelayConfig;
use convorelay_core::error::CompletionError;
use convorelay_core::provider::{CompletionClient, ContextWindow, Reply};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maximum number of error-body bytes copied into logs.
const ERROR_BODY_LOG_LIMIT: usize = 512;

pub struct OllamaClient {
    url: String,
    model: String,
    timeout: Duration,
    fallback_reply: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a client for the chat endpoint at `url`.
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        fallback_reply: impl Into<String>,
    ) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::Unreachable {
                detail: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            url: url.into(),
            model: model.into(),
            timeout,
            fallback_reply: fallback_reply.into(),
            client,
        })
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self, CompletionError> {
        Self::new(
            &config.backend_url,
            &config.model,
            Duration::from_secs(config.request_timeout_secs),
            &config.fallback_reply,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn timed_out(&self) -> CompletionError {
        CompletionError::Timeout {
            after_secs: self.timeout.as_secs(),
        }
    }

    fn classify(&self, e: reqwest::Error) -> CompletionError {
        if e.is_timeout() {
            self.timed_out()
        } else {
            CompletionError::Unreachable {
                detail: e.to_string(),
            }
        }
    }

    async fn send(&self, window: &ContextWindow) -> Result<Reply, CompletionError> {
        let body = window.to_request(&self.model);

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let snippet: String = error_body.chars().take(ERROR_BODY_LOG_LIMIT).collect();
            warn!(status = status.as_u16(), body = %snippet, "Backend returned error status");
            return Err(CompletionError::Unreachable {
                detail: format!("HTTP {status}"),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        self.parse_reply(&bytes)
    }

    /// Decode a 2xx body into a reply.
    fn parse_reply(&self, bytes: &[u8]) -> Result<Reply, CompletionError> {
        let parsed: ChatResponse =
            serde_json::from_slice(bytes).map_err(|e| CompletionError::MalformedResponse {
                detail: e.to_string(),
            })?;

        let content = parsed
            .message
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty());

        let content = match content {
            Some(c) => c,
            None => {
                warn!(model = %self.model, "Backend response has no answer; using fallback reply");
                self.fallback_reply.clone()
            }
        };

        Ok(Reply {
            content,
            model: parsed.model,
        })
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, window: &ContextWindow) -> Result<Reply, CompletionError> {
        debug!(
            model = %self.model,
            messages = window.len(),
            "Sending completion request"
        );
        let started = Instant::now();

        let result = match tokio::time::timeout(self.timeout, self.send(window)).await {
            Ok(result) => result,
            Err(_) => Err(self.timed_out()),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(reply) => debug!(elapsed_ms, chars = reply.content.len(), "Completion received"),
            Err(e) => warn!(elapsed_ms, kind = %e.kind(), error = %e, "Completion failed"),
        }
        result
    }

    /// The Ollama root answers `200 Ollama is running`.
    async fn health_check(&self) -> Result<bool, CompletionError> {
        let root = reqwest::Url::parse(&self.url)
            .and_then(|u| u.join("/"))
            .map_err(|e| CompletionError::Unreachable {
                detail: format!("invalid backend URL '{}': {e}", self.url),
            })?;

        let response = self
            .client
            .get(root)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        Ok(response.status().is_success())
    }
}

// --- Ollama API types ---

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use convorelay_core::error::CompletionErrorKind;
    use convorelay_core::message::Role;
    use convorelay_core::provider::WindowMessage;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    const FALLBACK: &str = "I didn't understand your question.";

    /// Serve `router` on an ephemeral port and return the chat URL.
    async fn spawn_backend(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api/chat")
    }

    fn client(url: &str, timeout: Duration) -> OllamaClient {
        OllamaClient::new(url, "gpt-oss:20b", timeout, FALLBACK).unwrap()
    }

    fn window() -> ContextWindow {
        ContextWindow {
            messages: vec![
                WindowMessage::new(Role::System, "P"),
                WindowMessage::new(Role::User, "hi"),
            ],
        }
    }

    async fn respond_with(body: &'static str) -> String {
        let router = Router::new().route(
            "/api/chat",
            post(move || async move {
                (
                    [(axum::http::header::CONTENT_TYPE, "application/json")],
                    body,
                )
            }),
        );
        spawn_backend(router).await
    }

    #[tokio::test]
    async fn returns_message_content() {
        let url = respond_with(r#"{"model":"gpt-oss:20b","message":{"role":"assistant","content":"hello"},"done":true}"#).await;
        let reply = client(&url, Duration::from_secs(5))
            .complete(&window())
            .await
            .unwrap();
        assert_eq!(reply.content, "hello");
        assert_eq!(reply.model.as_deref(), Some("gpt-oss:20b"));
    }

    #[tokio::test]
    async fn sends_model_messages_and_disables_streaming() {
        let captured: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let router = Router::new()
            .route(
                "/api/chat",
                post(
                    |State(seen): State<Arc<Mutex<Option<Value>>>>, Json(body): Json<Value>| async move {
                        *seen.lock().unwrap() = Some(body);
                        Json(json!({"message": {"content": "ok"}}))
                    },
                ),
            )
            .with_state(captured.clone());
        let url = spawn_backend(router).await;

        client(&url, Duration::from_secs(5))
            .complete(&window())
            .await
            .unwrap();

        let body = captured.lock().unwrap().clone().unwrap();
        assert_eq!(body["model"], "gpt-oss:20b");
        assert_eq!(body["stream"], false);
        assert_eq!(
            body["messages"],
            json!([
                {"role": "system", "content": "P"},
                {"role": "user", "content": "hi"}
            ])
        );
    }

    #[tokio::test]
    async fn missing_answer_uses_fallback_phrase() {
        let url = respond_with(r#"{"done":true}"#).await;
        let reply = client(&url, Duration::from_secs(5))
            .complete(&window())
            .await
            .unwrap();
        assert_eq!(reply.content, FALLBACK);
    }

    #[tokio::test]
    async fn blank_answer_uses_fallback_phrase() {
        let url = respond_with(r#"{"message":{"role":"assistant","content":"  "}}"#).await;
        let reply = client(&url, Duration::from_secs(5))
            .complete(&window())
            .await
            .unwrap();
        assert_eq!(reply.content, FALLBACK);
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let url = respond_with("<html>proxy error</html>").await;
        let err = client(&url, Duration::from_secs(5))
            .complete(&window())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), CompletionErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn wrongly_typed_answer_is_malformed() {
        let url = respond_with(r#"{"message":{"content":42}}"#).await;
        let err = client(&url, Duration::from_secs(5))
            .complete(&window())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), CompletionErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn server_error_is_unreachable() {
        let router = Router::new().route(
            "/api/chat",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
        );
        let url = spawn_backend(router).await;

        let err = client(&url, Duration::from_secs(5))
            .complete(&window())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), CompletionErrorKind::Unreachable);
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}/api/chat"), Duration::from_secs(5))
            .complete(&window())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), CompletionErrorKind::Unreachable);
    }

    #[tokio::test]
    async fn slow_backend_times_out_within_bound() {
        let router = Router::new().route(
            "/api/chat",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Json(json!({"message": {"content": "too late"}}))
            }),
        );
        let url = spawn_backend(router).await;

        let started = Instant::now();
        let err = client(&url, Duration::from_millis(300))
            .complete(&window())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), CompletionErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn health_check_hits_backend_root() {
        let router = Router::new().route("/", get(|| async { "Ollama is running" }));
        let url = spawn_backend(router).await;
        assert!(client(&url, Duration::from_secs(5)).health_check().await.unwrap());
    }

    #[test]
    fn from_config_uses_configured_bound() {
        let config = RelayConfig {
            request_timeout_secs: 7,
            ..RelayConfig::default()
        };
        let client = OllamaClient::from_config(&config).unwrap();
        assert_eq!(client.timeout, Duration::from_secs(7));
        assert_eq!(client.model(), "gpt-oss:20b");
    }
}
