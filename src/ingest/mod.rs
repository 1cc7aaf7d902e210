// src/ingest/mod.rs
//! Source adapters and the ordered chain that picks the first non-empty result set.

pub mod providers;
pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::model::RawResult;
use crate::ingest::types::{SearchRequest, SourceAdapter};

pub type DynAdapter = Arc<dyn SourceAdapter>;

/// Normalize text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Entities can be double-encoded in feed descriptions
    out = html_escape::decode_html_entities(&out).to_string();

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Run the adapters in order, one bounded attempt each, and return the first
/// non-empty result set. Exhausting the chain yields an empty set.
pub async fn run_chain(
    adapters: &[DynAdapter],
    request: &SearchRequest,
    timeout: Duration,
) -> Vec<RawResult> {
    for adapter in adapters {
        let t0 = Instant::now();
        let items = match tokio::time::timeout(timeout, adapter.fetch(request)).await {
            Ok(items) => items,
            Err(_) => {
                tracing::warn!(
                    adapter = adapter.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "adapter timed out"
                );
                counter!("newsdesk_adapter_errors_total", "adapter" => adapter.name())
                    .increment(1);
                Vec::new()
            }
        };
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("newsdesk_adapter_ms", "adapter" => adapter.name()).record(ms);

        if items.is_empty() {
            tracing::debug!(adapter = adapter.name(), "adapter returned nothing; trying next");
            continue;
        }

        counter!("newsdesk_adapter_results_total", "adapter" => adapter.name())
            .increment(items.len() as u64);
        tracing::info!(adapter = adapter.name(), count = items.len(), "adapter hit");
        return items;
    }
    Vec::new()
}
