//! AI adapter: generative backend abstraction + concrete providers.
//!
//! A [`Generator`] takes a prompt and returns the model's raw text. Nothing here
//! interprets that text; JSON extraction lives in `normalize`.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::{NewsError, Result};

pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Low-level provider: one remote call per `generate`, no retries.
pub trait Generator: Send + Sync {
    /// `web_search` asks the backend to ground the answer with its search tool.
    fn generate<'a>(&'a self, prompt: &'a str, web_search: bool) -> GenerateFuture<'a>;
    /// Provider name for logs and metrics.
    fn name(&self) -> &'static str;
}

pub type DynGenerator = Arc<dyn Generator>;

/// Factory: build a generator according to config and environment.
///
/// * `NEWSDESK_TEST_MODE=mock` → a [`MockGenerator`] answering `[]`.
/// * unknown provider or missing key → [`DisabledGenerator`].
pub fn build_generator(config: &ModelConfig) -> DynGenerator {
    if std::env::var("NEWSDESK_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockGenerator::new("[]"));
    }

    if config.api_key.trim().is_empty() {
        tracing::warn!(provider = %config.provider, "no API key configured; generator disabled");
        return Arc::new(DisabledGenerator);
    }

    let timeout = Duration::from_secs(config.timeout_secs);
    match config.provider.as_str() {
        "openai" => Arc::new(OpenAiGenerator::new(
            &config.api_key,
            &config.model,
            config.search_model.as_deref(),
            timeout,
        )),
        "gemini" => Arc::new(GeminiGenerator::new(&config.api_key, &config.model, timeout)),
        other => {
            tracing::warn!(provider = other, "unsupported provider; generator disabled");
            Arc::new(DisabledGenerator)
        }
    }
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("newsdesk/0.1 (+llm)")
        .connect_timeout(Duration::from_secs(4))
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

// ------------------------------------------------------------
// OpenAI
// ------------------------------------------------------------

/// OpenAI Chat Completions. With `web_search` it switches to the search model.
pub struct OpenAiGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
    search_model: String,
    base_url: String,
}

impl OpenAiGenerator {
    pub fn new(api_key: &str, model: &str, search_model: Option<&str>, timeout: Duration) -> Self {
        Self {
            http: http_client(timeout),
            api_key: api_key.to_string(),
            model: model.to_string(),
            search_model: search_model.unwrap_or("gpt-4o-mini-search-preview").to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct ChatMsg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<ChatMsg<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    web_search_options: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChatResp {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMsg,
}

#[derive(Deserialize)]
struct ChatChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

impl Generator for OpenAiGenerator {
    fn generate<'a>(&'a self, prompt: &'a str, web_search: bool) -> GenerateFuture<'a> {
        Box::pin(async move {
            let sys = "You are a news research assistant. Output only what the user asks for.";
            let req = ChatReq {
                model: if web_search { self.search_model.as_str() } else { self.model.as_str() },
                messages: vec![
                    ChatMsg { role: "system", content: sys },
                    ChatMsg { role: "user", content: prompt },
                ],
                // search models reject sampling parameters
                temperature: (!web_search).then_some(0.1),
                web_search_options: web_search.then(|| serde_json::json!({})),
            };

            let resp = self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
                .map_err(|e| NewsError::unavailable("openai", e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(NewsError::unavailable("openai", format!("HTTP {status}")));
            }
            let body: ChatResp = resp
                .json()
                .await
                .map_err(|e| NewsError::unavailable("openai", format!("decoding body: {e}")))?;
            let text = body
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default();
            if text.trim().is_empty() {
                return Err(NewsError::unavailable("openai", "empty completion"));
            }
            Ok(text)
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// ------------------------------------------------------------
// Gemini
// ------------------------------------------------------------

/// Google Gemini `generateContent`; `web_search` attaches the `google_search` tool.
pub struct GeminiGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiGenerator {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Self {
        Self {
            http: http_client(timeout),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Deserialize)]
struct GeminiResp {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

impl Generator for GeminiGenerator {
    fn generate<'a>(&'a self, prompt: &'a str, web_search: bool) -> GenerateFuture<'a> {
        Box::pin(async move {
            let mut body = serde_json::json!({
                "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            });
            if web_search {
                body["tools"] = serde_json::json!([{ "google_search": {} }]);
            }

            let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
            let resp = self
                .http
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| NewsError::unavailable("gemini", e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(NewsError::unavailable("gemini", format!("HTTP {status}")));
            }
            let parsed: GeminiResp = resp
                .json()
                .await
                .map_err(|e| NewsError::unavailable("gemini", format!("decoding body: {e}")))?;

            // grounded answers often arrive split over several parts
            let text: String = parsed
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content)
                .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
                .unwrap_or_default();
            if text.trim().is_empty() {
                return Err(NewsError::unavailable("gemini", "empty candidate"));
            }
            Ok(text)
        })
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

// ------------------------------------------------------------
// Disabled + mock
// ------------------------------------------------------------

/// Always unavailable; used when no provider is configured.
pub struct DisabledGenerator;

impl Generator for DisabledGenerator {
    fn generate<'a>(&'a self, _prompt: &'a str, _web_search: bool) -> GenerateFuture<'a> {
        Box::pin(async { Err(NewsError::unavailable("disabled", "no generator configured")) })
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Fixed response with call accounting, for tests and local runs.
pub struct MockGenerator {
    response: String,
    delay: Duration,
    calls: AtomicUsize,
    last_prompt: parking_lot::Mutex<Option<(String, bool)>>,
}

impl MockGenerator {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_prompt: parking_lot::Mutex::new(None),
        }
    }

    /// Sleep before answering (lets tests overlap concurrent callers).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Last `(prompt, web_search)` pair seen.
    pub fn last_prompt(&self) -> Option<(String, bool)> {
        self.last_prompt.lock().clone()
    }
}

impl Generator for MockGenerator {
    fn generate<'a>(&'a self, prompt: &'a str, web_search: bool) -> GenerateFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock() = Some((prompt.to_string(), web_search));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.response.clone())
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
