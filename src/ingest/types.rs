// src/ingest/types.rs
use async_trait::async_trait;
use metrics::counter;

use crate::error::Result;
use crate::model::RawResult;

/// Parameters shared by every backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    /// Two-letter region code, e.g. `kr`, `us`.
    pub region: String,
    /// Two-letter language code, e.g. `ko`, `en`.
    pub language: String,
    /// Only results newer than this many days; `None` = no restriction.
    pub recency_days: Option<u32>,
    pub max_results: usize,
}

impl SearchRequest {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            region: "kr".to_string(),
            language: "ko".to_string(),
            recency_days: Some(7),
            max_results: 6,
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// One upstream attempt. Errors are typed so the chain can log them.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RawResult>>;

    fn name(&self) -> &'static str;

    /// Never fails: any error becomes an empty result set.
    async fn fetch(&self, request: &SearchRequest) -> Vec<RawResult> {
        match self.search(request).await {
            Ok(mut items) => {
                items.truncate(request.max_results);
                items
            }
            Err(e) => {
                tracing::warn!(error = %e, adapter = self.name(), "adapter error");
                counter!("newsdesk_adapter_errors_total", "adapter" => self.name()).increment(1);
                Vec::new()
            }
        }
    }
}
