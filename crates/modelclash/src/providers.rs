//! HTTP model providers.
//!
//! Two wire formats cover every hosted model the tournament fields:
//!
//! | Provider                     | Endpoint                       | Auth                    |
//! |------------------------------|--------------------------------|-------------------------|
//! | [`OpenAiCompatibleProvider`] | `{base}/chat/completions`      | `Authorization: Bearer` |
//! | [`AnthropicProvider`]        | `{base}/messages`              | `x-api-key`             |
//!
//! OpenRouter speaks the first format for all vendors, so the default
//! configuration needs a single key. Response bodies are read as text and
//! parsed by pure functions so the parsing can be tested without a server.

use std::sync::Arc;
use std::time::Duration;

use arena::{Provider, ProviderError, ProviderRegistry, RateLimiter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{ApiKind, ClashConfig, RouteConfig};

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ── Shared plumbing ──────────────────────────────────────────────────

fn build_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))
}

fn map_send_error(e: reqwest::Error, timeout: Duration) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Request(e.to_string())
    }
}

/// Map a non-success status to the matching error variant.
pub fn classify_status(status: u16, body: String) -> ProviderError {
    if status == 429 {
        ProviderError::RateLimited(body)
    } else {
        ProviderError::Status { status, body }
    }
}

/// Model id sent on the wire; drops the `vendor/` prefix when asked.
pub fn wire_model(model: &str, strip_prefix: bool) -> &str {
    if strip_prefix {
        model.split_once('/').map(|(_, rest)| rest).unwrap_or(model)
    } else {
        model
    }
}

fn read_api_key(route: &RouteConfig) -> Result<String, ProviderError> {
    std::env::var(&route.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ProviderError::MissingApiKey(route.api_key_env.clone()))
}

async fn post_json<T: Serialize + ?Sized>(
    request: reqwest::RequestBuilder,
    body: &T,
    timeout: Duration,
) -> Result<String, ProviderError> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| map_send_error(e, timeout))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| map_send_error(e, timeout))?;
    if !status.is_success() {
        return Err(classify_status(status.as_u16(), text));
    }
    Ok(text)
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ── OpenAI-compatible chat completions ───────────────────────────────

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Extract the first choice's text from a chat-completions body.
///
/// OpenRouter reports some upstream failures as a 200 with an `error`
/// object; those become `MalformedResponse`.
pub fn parse_chat_response(body: &str) -> Result<String, ProviderError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("invalid JSON: {e}")))?;
    if let Some(err) = parsed.error {
        return Err(ProviderError::MalformedResponse(err.message));
    }
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ProviderError::MalformedResponse("no message content in choices".into()))
}

/// Chat-completions client for OpenRouter, OpenAI or any compatible server.
pub struct OpenAiCompatibleProvider {
    label: String,
    endpoint: String,
    api_key: String,
    max_tokens: u32,
    strip_prefix: bool,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        label: impl Into<String>,
        base_url: &str,
        api_key: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            label: label.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            max_tokens,
            strip_prefix: false,
            timeout,
            client: build_client(timeout)?,
        })
    }

    pub fn with_strip_prefix(mut self, strip: bool) -> Self {
        self.strip_prefix = strip;
        self
    }

    /// Build from a route, reading the key from its environment variable.
    pub fn from_route(route: &RouteConfig) -> Result<Self, ProviderError> {
        Ok(Self::new(
            route.label(),
            &route.base_url,
            read_api_key(route)?,
            route.max_tokens,
            Duration::from_secs(route.timeout_secs),
        )?
        .with_strip_prefix(route.strip_prefix))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: wire_model(model, self.strip_prefix),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
        };
        let builder = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key));
        let body = post_json(builder, &request, self.timeout).await?;
        parse_chat_response(&body)
    }
}

// ── Anthropic messages ───────────────────────────────────────────────

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Concatenate the text blocks of a messages-API body.
pub fn parse_messages_response(body: &str) -> Result<String, ProviderError> {
    let parsed: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("invalid JSON: {e}")))?;
    if let Some(err) = parsed.error {
        return Err(ProviderError::MalformedResponse(err.message));
    }
    let text: Vec<String> = parsed
        .content
        .into_iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text)
        .collect();
    if text.is_empty() {
        return Err(ProviderError::MalformedResponse(
            "no text blocks in content".into(),
        ));
    }
    Ok(text.join(""))
}

/// Direct client for the Anthropic messages API.
pub struct AnthropicProvider {
    label: String,
    endpoint: String,
    api_key: String,
    max_tokens: u32,
    strip_prefix: bool,
    timeout: Duration,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn from_route(route: &RouteConfig) -> Result<Self, ProviderError> {
        let timeout = Duration::from_secs(route.timeout_secs);
        Ok(Self {
            label: route.label(),
            endpoint: format!("{}/messages", route.base_url.trim_end_matches('/')),
            api_key: read_api_key(route)?,
            max_tokens: route.max_tokens,
            strip_prefix: route.strip_prefix,
            timeout,
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        let request = MessagesRequest {
            model: wire_model(model, self.strip_prefix),
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let builder = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let body = post_json(builder, &request, self.timeout).await?;
        parse_messages_response(&body)
    }
}

// ── Registry construction ────────────────────────────────────────────

fn build_provider(route: &RouteConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    Ok(match route.api {
        ApiKind::OpenAiCompatible => Arc::new(OpenAiCompatibleProvider::from_route(route)?),
        ApiKind::Anthropic => Arc::new(AnthropicProvider::from_route(route)?),
    })
}

fn build_limiter(route: &RouteConfig) -> Option<RateLimiter> {
    route
        .rate_limit
        .map(|n| RateLimiter::new(n, Duration::from_secs(route.rate_period_secs)))
}

/// Registry with one route per configured prefix plus the default route.
///
/// Fails with `MissingApiKey` if any route's key variable is unset.
pub fn build_registry(config: &ClashConfig) -> Result<ProviderRegistry, ProviderError> {
    let mut registry = ProviderRegistry::new();
    for route in &config.routes {
        let Some(prefix) = route.prefix.as_deref() else {
            continue;
        };
        info!(prefix, base_url = %route.base_url, "Registering provider route");
        registry = registry.with_route(prefix, build_provider(route)?, build_limiter(route));
    }
    info!(base_url = %config.provider.base_url, "Registering default provider");
    registry = registry.with_default(build_provider(&config.provider)?, build_limiter(&config.provider));
    Ok(registry)
}
