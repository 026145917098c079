use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use waypoint_core::config::LlmConfig;
use waypoint_core::LlmProvider;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> &'static str;

    /// `false` when every completion is known to fail without a request.
    fn is_available(&self) -> bool {
        true
    }

    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;
}

pub fn client_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::Disabled => Arc::new(UnavailableLlm),
        LlmProvider::OpenAi => {
            let base = config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
            Arc::new(OpenAiCompatibleClient {
                http,
                provider: LlmProvider::OpenAi.as_str(),
                endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
                api_key: config.api_key.clone(),
                model: config.model.clone(),
                max_tokens: config.max_tokens,
            })
        }
        LlmProvider::Ollama => {
            let base = config
                .base_url
                .as_deref()
                .ok_or_else(|| anyhow!("ollama provider requires a base url"))?
                .trim_end_matches('/');
            let base = if base.ends_with("/v1") { base.to_string() } else { format!("{base}/v1") };
            Arc::new(OpenAiCompatibleClient {
                http,
                provider: LlmProvider::Ollama.as_str(),
                endpoint: format!("{base}/chat/completions"),
                api_key: config.api_key.clone(),
                model: config.model.clone(),
                max_tokens: config.max_tokens,
            })
        }
        LlmProvider::Anthropic => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| anyhow!("anthropic provider requires an api key"))?;
            let base = config.base_url.as_deref().unwrap_or(ANTHROPIC_BASE_URL);
            Arc::new(AnthropicClient {
                http,
                endpoint: format!("{}/v1/messages", base.trim_end_matches('/')),
                api_key,
                model: config.model.clone(),
                max_tokens: config.max_tokens,
            })
        }
    };
    Ok(client)
}

/// Chat-completions client for OpenAI and servers speaking the same API (Ollama).
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    provider: &'static str,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    fn provider(&self) -> &'static str {
        self.provider
    }

    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens: self.max_tokens,
        };

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.with_context(|| {
            format!("{} request to {} failed", self.provider, self.endpoint)
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} API error {}: {}", self.provider, status, body));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .with_context(|| format!("{} returned an unreadable response", self.provider))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("{} returned no completion", self.provider))?;

        debug!(
            event_name = "llm.completion.received",
            provider = self.provider,
            model = %self.model,
            chars = content.len(),
            "completion received"
        );
        Ok(content)
    }
}

pub struct AnthropicClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<&'a ChatMessage>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> &'static str {
        LlmProvider::Anthropic.as_str()
    }

    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let system = messages
            .iter()
            .filter(|message| message.role == ChatRole::System)
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>();
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: messages.iter().filter(|message| message.role != ChatRole::System).collect(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("anthropic request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("anthropic API error {}: {}", status, body));
        }

        let parsed: AnthropicResponse =
            response.json().await.context("anthropic returned an unreadable response")?;
        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| anyhow!("anthropic returned no text content"))
    }
}

/// Client for the `disabled` provider. Every completion fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableLlm;

#[async_trait]
impl LlmClient for UnavailableLlm {
    fn provider(&self) -> &'static str {
        LlmProvider::Disabled.as_str()
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn complete(&self, _messages: &[ChatMessage], _temperature: f32) -> Result<String> {
        Err(anyhow!("language model is disabled"))
    }
}

/// Replays queued replies in order and records every request it receives.
/// An exhausted script fails like an unreachable provider.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let script = Self::new();
        for reply in replies {
            script.push_reply(reply);
        }
        script
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        lock(&self.replies).push_back(Ok(reply.into()));
    }

    pub fn push_failure(&self, error: impl Into<String>) {
        lock(&self.replies).push_back(Err(error.into()));
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        lock(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn provider(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, messages: &[ChatMessage], _temperature: f32) -> Result<String> {
        lock(&self.requests).push(messages.to_vec());
        match lock(&self.replies).pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(error)) => Err(anyhow!(error)),
            None => Err(anyhow!("scripted model has no reply left")),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
