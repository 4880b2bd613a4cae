#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **otel-advisor-llm** – the single HTTP integration point with the
//! external advisory LLM.
//!
//! Structured the way this codebase's LLM gateway structures its provider
//! implementations: a small async trait (`AdvisoryClient`) so the data path
//! and tests never depend on `reqwest` directly, one concrete HTTP
//! implementation, and credentials held behind `secrecy::Secret` so they
//! never leak into `Debug` output or logs.

mod error;

pub use error::AdvisoryError;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

const SYSTEM_PROMPT: &str = "You are an observability cost and noise optimization advisor. \
Given a sample of anonymized telemetry and the operator's label policies, recommend what to drop, \
which label policies are being violated, and concrete OpenTelemetry filter-processor rules. \
Always structure your reply with exactly these four sections, each on its own line: \
\"SIGNALS TO DROP\", \"LABEL POLICY VIOLATIONS\", \"OTEL FILTER RULES\", and \"RATIONALE\".";

/// Configuration for [`HttpAdvisoryClient`].
#[derive(Clone)]
pub struct AdvisoryConfig {
    /// Bearer credential for the advisory service.
    pub api_key: Secret<String>,
    /// Base URL of the chat-completion endpoint.
    pub endpoint: String,
    /// Model identifier to request.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl std::fmt::Debug for AdvisoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisoryConfig")
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl AdvisoryConfig {
    /// Build a configuration with the default 30s timeout.
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            endpoint: endpoint.into(),
            model: model.into(),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Abstraction over "ask the advisory service for a recommendation", so the
/// [`Recommender`](https://docs.rs) (in `otel-advisor-recommender`) and its
/// tests never need a live HTTP endpoint.
#[async_trait]
pub trait AdvisoryClient: Send + Sync {
    /// Ask for a recommendation given an anonymized sample (already
    /// serialized to JSON) and a list of rendered policy summaries. Returns
    /// the raw free-text reply.
    async fn recommend(&self, sample_json: &str, policy_summaries: &[String]) -> Result<String, AdvisoryError>;

    /// A lightweight connectivity probe using a trivial prompt.
    async fn validate_connection(&self) -> Result<(), AdvisoryError>;
}

/// The concrete HTTP-backed [`AdvisoryClient`].
pub struct HttpAdvisoryClient {
    http: reqwest::Client,
    config: AdvisoryConfig,
}

impl HttpAdvisoryClient {
    /// Construct a new client. Fails if the configuration cannot build a
    /// valid HTTP client (e.g. an invalid timeout).
    pub fn new(config: AdvisoryConfig) -> Result<Self, AdvisoryError> {
        if config.api_key.expose_secret().is_empty() {
            return Err(AdvisoryError::Configuration("api_key must not be empty".to_string()));
        }
        if config.endpoint.is_empty() {
            return Err(AdvisoryError::Configuration("endpoint must not be empty".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("otel-advisor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AdvisoryError::Configuration(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn headers(&self) -> Result<HeaderMap, AdvisoryError> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.config.api_key.expose_secret());
        let mut value = HeaderValue::from_str(&auth)
            .map_err(|e| AdvisoryError::Configuration(e.to_string()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn chat(&self, user_prompt: String) -> Result<String, AdvisoryError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT.to_string() },
                ChatMessage { role: "user", content: user_prompt },
            ],
            stream: false,
        };

        let response = self
            .http
            .post(&self.config.endpoint)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AdvisoryError::Timeout
                } else {
                    AdvisoryError::Transport { status: 0, body: e.to_string() }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(512).collect();
            return Err(AdvisoryError::Transport { status: status.as_u16(), body: truncated });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AdvisoryError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AdvisoryError::MalformedResponse("no choices in response".to_string()))
    }
}

#[async_trait]
impl AdvisoryClient for HttpAdvisoryClient {
    #[instrument(skip(self, sample_json, policy_summaries), fields(model = %self.config.model))]
    async fn recommend(&self, sample_json: &str, policy_summaries: &[String]) -> Result<String, AdvisoryError> {
        let mut prompt = String::new();
        prompt.push_str("TELEMETRY SAMPLE (anonymized, JSON):\n");
        prompt.push_str(sample_json);
        prompt.push_str("\n\nLABEL POLICIES:\n");
        for (i, summary) in policy_summaries.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, summary));
        }
        self.chat(prompt).await
    }

    #[instrument(skip(self))]
    async fn validate_connection(&self) -> Result<(), AdvisoryError> {
        match self.chat("Hello".to_string()).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "advisory connectivity probe failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpAdvisoryClient {
        let config = AdvisoryConfig::new("sk-test-key", format!("{}/chat", server.uri()), "advisor-1");
        HttpAdvisoryClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn recommend_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "SIGNALS TO DROP\n- debug logs"}}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let reply = client.recommend("{}", &[]).await.unwrap();
        assert!(reply.contains("SIGNALS TO DROP"));
    }

    #[tokio::test]
    async fn non_2xx_becomes_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.recommend("{}", &[]).await.unwrap_err();
        match err {
            AdvisoryError::Transport { status, body } => {
                assert_eq!(status, 503);
                assert!(body.contains("overloaded"));
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn validate_connection_succeeds_on_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "pong"}}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.validate_connection().await.is_ok());
    }

    #[test]
    fn rejects_empty_api_key() {
        let config = AdvisoryConfig::new("", "https://example.com", "m");
        assert!(HttpAdvisoryClient::new(config).is_err());
    }

    #[test]
    fn debug_impl_never_prints_api_key() {
        let config = AdvisoryConfig::new("sk-super-secret", "https://example.com", "m");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-super-secret"));
    }
}
