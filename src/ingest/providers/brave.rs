//! Brave Search API: the keyword search backend (web or news vertical).

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;

use crate::error::{NewsError, Result};
use crate::ingest::normalize_text;
use crate::ingest::types::{SearchRequest, SourceAdapter};
use crate::model::RawResult;

pub const ADAPTER_NAME: &str = "brave";
const BASE_URL: &str = "https://api.search.brave.com/res/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BraveMode {
    Web,
    News,
}

impl BraveMode {
    fn path(self) -> &'static str {
        match self {
            Self::Web => "web/search",
            Self::News => "news/search",
        }
    }
}

/// Brave only knows day/week/month/year windows; round up to the next one.
pub fn freshness_for(recency_days: Option<u32>) -> Option<&'static str> {
    match recency_days? {
        0 => None,
        1 => Some("pd"),
        2..=7 => Some("pw"),
        8..=31 => Some("pm"),
        _ => Some("py"),
    }
}

pub struct BraveSearchAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    mode: BraveMode,
}

impl BraveSearchAdapter {
    pub fn new(api_key: &str, mode: BraveMode, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("newsdesk/0.1 (+search)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: BASE_URL.to_string(),
            mode,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Pull records out of a Brave response. Web results live under
    /// `web.results`, news results under `results`.
    pub fn parse_response(json: &Value, mode: BraveMode) -> Vec<RawResult> {
        let results = match mode {
            BraveMode::Web => json.pointer("/web/results"),
            BraveMode::News => json.get("results"),
        };
        let Some(items) = results.and_then(Value::as_array) else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let text = |key: &str| item.get(key).and_then(Value::as_str).map(normalize_text);
                let mut raw = RawResult::new(ADAPTER_NAME);
                if let Some(t) = text("title") {
                    raw.insert("title", t);
                }
                if let Some(u) = item.get("url").and_then(Value::as_str) {
                    raw.insert("url", u.trim());
                }
                if let Some(d) = text("description") {
                    raw.insert("description", d);
                }
                if let Some(p) = item.get("page_age").and_then(Value::as_str) {
                    raw.insert("page_age", p);
                }
                if let Some(a) = item.get("age").and_then(Value::as_str) {
                    raw.insert("age", a);
                }
                let site = item
                    .pointer("/profile/name")
                    .or_else(|| item.pointer("/meta_url/hostname"))
                    .and_then(Value::as_str);
                if let Some(s) = site {
                    raw.insert("site", s);
                }
                (!raw.fields.is_empty()).then_some(raw)
            })
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for BraveSearchAdapter {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RawResult>> {
        if self.api_key.trim().is_empty() {
            return Err(NewsError::unavailable(ADAPTER_NAME, "missing BRAVE_API_KEY"));
        }

        let mut params: Vec<(&str, String)> = vec![
            ("q", request.query.clone()),
            ("count", request.max_results.clamp(1, 20).to_string()),
            ("country", request.region.to_ascii_uppercase()),
            ("search_lang", request.language.to_ascii_lowercase()),
        ];
        if let Some(f) = freshness_for(request.recency_days) {
            params.push(("freshness", f.to_string()));
        }

        let url = format!("{}/{}", self.base_url, self.mode.path());
        let resp = self
            .client
            .get(&url)
            .query(&params)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await
            .map_err(|e| NewsError::unavailable(ADAPTER_NAME, format!("http get: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            counter!("newsdesk_upstream_status_total", "adapter" => ADAPTER_NAME, "status" => status.as_u16().to_string())
                .increment(1);
            return Err(NewsError::unavailable(ADAPTER_NAME, format!("HTTP {status}")));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| NewsError::unavailable(ADAPTER_NAME, format!("decoding json: {e}")))?;
        Ok(Self::parse_response(&json, self.mode))
    }

    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }
}
