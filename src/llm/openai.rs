use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
const DEFAULT_TEMPERATURE: f32 = 0.0;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Settings for an OpenAI-compatible chat endpoint (Groq by default).
#[derive(Clone, Debug)]
pub struct ChatClientConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    pub default_temperature: f32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            default_temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

impl ChatClientConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        // `groqPass` is the key name older .env files used
        cfg.api_key = std::env::var("GROQ_API_KEY")
            .or_else(|_| std::env::var("groqPass"))
            .ok()
            .filter(|k| !k.trim().is_empty());
        if let Ok(base) = std::env::var("GROQ_BASE_URL") {
            cfg.base_url = base;
        }
        if let Ok(model) = std::env::var("GROQ_MODEL") {
            cfg.default_model = model;
        }
        if let Ok(temp) = std::env::var("GROQ_TEMPERATURE") {
            if let Ok(parsed) = temp.parse::<f32>() {
                cfg.default_temperature = parsed;
            }
        }
        if let Ok(timeout) = std::env::var("GROQ_TIMEOUT_SECS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                cfg.timeout = Duration::from_secs(parsed);
            }
        }
        if let Ok(retries) = std::env::var("GROQ_MAX_RETRIES") {
            if let Ok(parsed) = retries.parse::<u32>() {
                cfg.max_retries = parsed;
            }
        }
        cfg
    }
}

/// Single-attempt HTTP client; wrap it in [`Retrying`] for the configured retries.
#[derive(Clone)]
pub struct ChatClient {
    http: HttpClient,
    cfg: ChatClientConfig,
}

impl ChatClient {
    pub fn new(cfg: ChatClientConfig) -> Result<Self, LlmError> {
        let http = HttpClient::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(LlmError::http)?;
        Ok(Self { http, cfg })
    }

    /// Client with the configured retry budget applied.
    pub fn retrying(cfg: ChatClientConfig) -> Result<Retrying<Self>, LlmError> {
        let (max_retries, backoff) = (cfg.max_retries, cfg.retry_backoff);
        Ok(Retrying::new(Self::new(cfg)?, max_retries, backoff))
    }

    pub fn model(&self) -> &str {
        &self.cfg.default_model
    }

    fn api_key(&self) -> Result<&str, LlmError> {
        self.cfg.api_key.as_deref().ok_or(LlmError::MissingApiKey)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        )
    }

    fn build_api_request(&self, req: &ChatCompletionRequest) -> ApiChatCompletionRequest {
        ApiChatCompletionRequest {
            model: req
                .model
                .clone()
                .unwrap_or_else(|| self.cfg.default_model.clone()),
            temperature: req
                .temperature
                .unwrap_or(self.cfg.default_temperature),
            max_tokens: req.max_tokens,
            messages: req
                .messages
                .iter()
                .map(|m| ApiChatMessage {
                    role: m.role.as_api_str().to_string(),
                    content: Some(m.content.clone()),
                })
                .collect(),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, LlmError>;
}

#[async_trait]
impl LlmClient for ChatClient {
    async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, LlmError> {
        if request.messages.is_empty() {
            return Err(LlmError::EmptyMessages);
        }

        let api_key = self.api_key()?;
        let api_request = self.build_api_request(&request);
        let endpoint = self.endpoint();

        let response = self
            .http
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(LlmError::http)?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(LlmError::http)?;

        if !status.is_success() {
            let api_err = serde_json::from_slice::<ApiErrorEnvelope>(&bytes)
                .ok()
                .map(|env| env.error);
            return Err(LlmError::Api {
                status,
                error: api_err.unwrap_or_default(),
            });
        }

        decode_completion(&bytes)
    }
}

fn decode_completion(bytes: &[u8]) -> Result<ChatCompletionResponse, LlmError> {
    let parsed: ApiChatCompletionResponse = serde_json::from_slice(bytes).map_err(LlmError::Decode)?;
    let usage = parsed.usage.map(|usage| UsageMetrics {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    });
    let content = parsed
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .unwrap_or_default();
    Ok(ChatCompletionResponse { content, usage })
}

/// Retries retryable failures up to `max_retries` extra times with doubling backoff.
pub struct Retrying<C> {
    inner: C,
    max_retries: u32,
    backoff: Duration,
}

impl<C: LlmClient> Retrying<C> {
    pub fn new(inner: C, max_retries: u32, backoff: Duration) -> Self {
        Self { inner, max_retries, backoff }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for Retrying<C> {
    async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let mut attempt = 0u32;
        loop {
            match self.inner.chat_completion(request.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff * 2u32.pow(attempt);
                    attempt += 1;
                    tracing::debug!(attempt, error = %err, "retrying chat completion");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatCompletionRequest {
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChatRole {
    System,
}

impl ChatRole {
    fn as_api_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
        }
    }
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatCompletionResponse {
    pub content: String,
    pub usage: Option<UsageMetrics>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UsageMetrics {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

#[derive(Debug)]
pub enum LlmError {
    MissingApiKey,
    EmptyMessages,
    Http(reqwest::Error),
    Timeout,
    Api {
        status: StatusCode,
        error: ApiErrorBody,
    },
    #[cfg(test)]
    MockQueueEmpty,
    Decode(serde_json::Error),
}

impl LlmError {
    fn http(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Http(err)
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout => true,
            LlmError::Http(_) => true,
            LlmError::Api { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            LlmError::MissingApiKey
            | LlmError::EmptyMessages
            | LlmError::Decode(_) => false,
            #[cfg(test)]
            LlmError::MockQueueEmpty => false,
        }
    }
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::MissingApiKey => write!(f, "GROQ_API_KEY is not set"),
            LlmError::EmptyMessages => {
                write!(f, "chat completion requires at least one message")
            }
            LlmError::Http(err) => write!(f, "http error: {err}"),
            LlmError::Timeout => write!(f, "request timed out"),
            LlmError::Api { status, error } => {
                write!(f, "api error {status}: {}", error.message)
            }
            #[cfg(test)]
            LlmError::MockQueueEmpty => {
                write!(f, "mock client response queue is empty")
            }
            LlmError::Decode(err) => write!(f, "decode error: {err}"),
        }
    }
}

impl std::error::Error for LlmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LlmError::Http(err) => Some(err),
            LlmError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl Default for ApiErrorBody {
    fn default() -> Self {
        Self {
            message: "unknown error".to_string(),
            r#type: None,
            code: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[cfg(test)]
pub use mock::MockClient;


#[derive(Debug, Clone, Serialize)]
struct ApiChatCompletionRequest {
    model: String,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    messages: Vec<ApiChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiChatMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiChatCompletionResponse {
    choices: Vec<ApiChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiChatChoice {
    message: ApiChatMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ChatClientConfig {
        ChatClientConfig {
            api_key: Some("test".into()),
            ..ChatClientConfig::default()
        }
    }

    fn summary_request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: None,
            messages: vec![ChatMessage::new(ChatRole::System, "Summarize this.")],
            max_tokens: None,
            temperature: None,
        }
    }

    #[test]
    fn build_request_uses_zero_temperature_and_no_token_cap() {
        let client = ChatClient::new(test_config()).unwrap();
        let api_request = client.build_api_request(&summary_request());
        let value = serde_json::to_value(&api_request).unwrap();

        assert_eq!(value["model"], "llama-3.1-8b-instant");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][0]["content"], "Summarize this.");
        assert_eq!(value["temperature"], 0.0);
        assert!(value.get("max_tokens").is_none());
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let client = ChatClient::new(ChatClientConfig {
            base_url: "http://localhost:8080/v1/".into(),
            ..test_config()
        })
        .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[tokio::test]
    async fn missing_api_key_fails_at_call_time() {
        let client = ChatClient::new(ChatClientConfig::default()).unwrap();
        let err = client.chat_completion(summary_request()).await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn retrying_recovers_after_transient_failures() {
        let mock = MockClient::new();
        mock.push_response(Err(LlmError::Timeout));
        mock.push_response(Err(LlmError::Timeout));
        mock.push_text("done");

        let client = Retrying::new(mock, 2, Duration::ZERO);
        let out = client.chat_completion(summary_request()).await.unwrap();
        assert_eq!(out.content, "done");
        assert_eq!(client.inner().calls().len(), 3);
    }

    #[tokio::test]
    async fn retrying_gives_up_after_two_retries() {
        let mock = MockClient::new();
        for _ in 0..4 {
            mock.push_response(Err(LlmError::Timeout));
        }

        let client = Retrying::new(mock, 2, Duration::ZERO);
        let err = client.chat_completion(summary_request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout));
        assert_eq!(client.inner().calls().len(), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_are_returned_immediately() {
        let mock = MockClient::new();
        mock.push_response(Err(LlmError::MissingApiKey));

        let client = Retrying::new(mock, 2, Duration::ZERO);
        assert!(client.chat_completion(summary_request()).await.is_err());
        assert_eq!(client.inner().calls().len(), 1);
    }

    #[test]
    fn decode_reads_first_content_and_token_usage() {
        let body = br#"{
            "choices": [{"message": {"role": "assistant", "content": "Three sentences."}}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}
        }"#;
        let resp = decode_completion(body).unwrap();
        assert_eq!(resp.content, "Three sentences.");
        let usage = resp.usage.unwrap();
        assert_eq!(usage.prompt_tokens, Some(120));
        assert_eq!(usage.total_tokens, Some(150));
    }

    #[test]
    fn decode_rejects_malformed_body() {
        assert!(matches!(decode_completion(b"not json"), Err(LlmError::Decode(_))));
    }

    #[test]
    fn api_error_display_includes_status() {
        let err = LlmError::Api {
            status: StatusCode::BAD_REQUEST,
            error: ApiErrorBody {
                message: "bad request".into(),
                r#type: Some("invalid_request_error".into()),
                code: None,
            },
        };

        assert_eq!(
            format!("{err}"),
            "api error 400 Bad Request: bad request"
        );
        assert!(!err.is_retryable());
        assert!(LlmError::Api { status: StatusCode::TOO_MANY_REQUESTS, error: ApiErrorBody::default() }.is_retryable());
    }
}
