//! Google News RSS search: the news-specific backend.

use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::error::{NewsError, Result};
use crate::ingest::normalize_text;
use crate::ingest::types::{SearchRequest, SourceAdapter};
use crate::model::RawResult;

pub const ADAPTER_NAME: &str = "google_news";
const BASE_URL: &str = "https://news.google.com/rss/search";

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    source: Option<ItemSource>,
}

#[derive(Debug, Deserialize)]
struct ItemSource {
    #[serde(rename = "@url")]
    url: Option<String>,
    #[serde(rename = "$text")]
    name: Option<String>,
}

/// RFC 2822 `pubDate` → `YYYY.MM.DD` (UTC). Unparsable input yields `None`.
fn rfc2822_to_dotted(ts: &str) -> Option<String> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    let dt = dt.to_offset(time::UtcOffset::UTC);
    Some(format!(
        "{:04}.{:02}.{:02}",
        dt.year(),
        u8::from(dt.month()),
        dt.day()
    ))
}

/// Google appends `" - Outlet"` to every headline; drop it when it matches the source.
fn strip_source_suffix(title: &str, source: Option<&str>) -> String {
    match source {
        Some(src) if !src.is_empty() => {
            let suffix = format!(" - {src}");
            title
                .strip_suffix(suffix.as_str())
                .unwrap_or(title)
                .trim()
                .to_string()
        }
        _ => title.to_string(),
    }
}

pub struct GoogleNewsRssAdapter {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        base_url: String,
        client: reqwest::Client,
    },
}

impl GoogleNewsRssAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_url(BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("newsdesk/0.1 (+rss)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            mode: Mode::Http {
                base_url: base_url.to_string(),
                client,
            },
        }
    }

    /// Serve a fixed RSS document instead of calling the network.
    pub fn from_fixture_str(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    /// Query string for the search endpoint, recency folded into `when:Nd`.
    pub fn search_params(request: &SearchRequest) -> Vec<(&'static str, String)> {
        let q = match request.recency_days {
            Some(days) if days > 0 => format!("{} when:{days}d", request.query),
            _ => request.query.clone(),
        };
        let region = request.region.to_ascii_uppercase();
        let lang = request.language.to_ascii_lowercase();
        vec![
            ("q", q),
            ("hl", lang.clone()),
            ("gl", region.clone()),
            ("ceid", format!("{region}:{lang}")),
        ]
    }

    pub fn parse_items_from_str(s: &str) -> Result<Vec<RawResult>> {
        let t0 = std::time::Instant::now();
        let rss: Rss = from_str(s)
            .map_err(|e| NewsError::unavailable(ADAPTER_NAME, format!("parsing rss xml: {e}")))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let source_name = it
                .source
                .as_ref()
                .and_then(|s| s.name.as_deref())
                .map(normalize_text);
            let title = it
                .title
                .as_deref()
                .map(normalize_text)
                .map(|t| strip_source_suffix(&t, source_name.as_deref()))
                .unwrap_or_default();

            let mut raw = RawResult::new(ADAPTER_NAME).with("title", title);
            if let Some(link) = it.link {
                raw.insert("link", link.trim());
            }
            if let Some(name) = source_name {
                raw.insert("source", name);
            }
            if let Some(site) = it.source.and_then(|s| s.url) {
                raw.insert("site", site);
            }
            if let Some(date) = it.pub_date.as_deref().and_then(rfc2822_to_dotted) {
                raw.insert("date", date);
            }
            if let Some(desc) = it.description.as_deref() {
                raw.insert("description", normalize_text(desc));
            }
            if raw.fields.is_empty() {
                continue;
            }
            out.push(raw);
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("newsdesk_parse_ms", "adapter" => ADAPTER_NAME).record(ms);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for GoogleNewsRssAdapter {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RawResult>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items_from_str(s),
            Mode::Http { base_url, client } => {
                let resp = client
                    .get(base_url)
                    .query(&Self::search_params(request))
                    .send()
                    .await
                    .map_err(|e| NewsError::unavailable(ADAPTER_NAME, format!("http get: {e}")))?;
                let status = resp.status();
                if !status.is_success() {
                    counter!("newsdesk_upstream_status_total", "adapter" => ADAPTER_NAME, "status" => status.as_u16().to_string())
                        .increment(1);
                    return Err(NewsError::unavailable(
                        ADAPTER_NAME,
                        format!("HTTP {status}"),
                    ));
                }
                let body = resp
                    .text()
                    .await
                    .map_err(|e| NewsError::unavailable(ADAPTER_NAME, format!("http body: {e}")))?;
                Self::parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pub_date_becomes_dotted_utc_date() {
        assert_eq!(
            rfc2822_to_dotted("Tue, 21 May 2024 07:00:00 GMT").as_deref(),
            Some("2024.05.21")
        );
        assert_eq!(
            rfc2822_to_dotted("Tue, 21 May 2024 23:30:00 -0500").as_deref(),
            Some("2024.05.22")
        );
        assert!(rfc2822_to_dotted("yesterday").is_none());
    }

    #[test]
    fn source_suffix_is_removed_only_when_it_matches() {
        assert_eq!(
            strip_source_suffix("Budget grows - Korea Herald", Some("Korea Herald")),
            "Budget grows"
        );
        assert_eq!(
            strip_source_suffix("Budget grows - Reuters", Some("Korea Herald")),
            "Budget grows - Reuters"
        );
        assert_eq!(strip_source_suffix("Budget grows", None), "Budget grows");
    }

    #[test]
    fn params_encode_region_language_and_recency() {
        let mut req = SearchRequest::new("R&D policy");
        req.region = "kr".into();
        req.language = "ko".into();
        req.recency_days = Some(7);
        let params = GoogleNewsRssAdapter::search_params(&req);
        assert!(params.contains(&("q", "R&D policy when:7d".to_string())));
        assert!(params.contains(&("gl", "KR".to_string())));
        assert!(params.contains(&("hl", "ko".to_string())));
        assert!(params.contains(&("ceid", "KR:ko".to_string())));

        req.recency_days = None;
        let params = GoogleNewsRssAdapter::search_params(&req);
        assert!(params.contains(&("q", "R&D policy".to_string())));
    }

    #[test]
    fn empty_channel_parses_to_nothing() {
        let xml = r#"<rss version="2.0"><channel><title>x</title></channel></rss>"#;
        let items = GoogleNewsRssAdapter::parse_items_from_str(xml).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn garbage_is_source_unavailable() {
        let err = GoogleNewsRssAdapter::parse_items_from_str("<html>").unwrap_err();
        assert_eq!(err.kind(), "source_unavailable");
    }
}
