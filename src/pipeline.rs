// src/pipeline.rs
//! # Pipeline
//! cache lookup → adapter chain → model cleanup (or fallback) → dedup/sort → cache write.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use metrics::{counter, histogram};

use crate::ai_adapter::{build_generator, DisabledGenerator, DynGenerator};
use crate::cache::ArticleCache;
use crate::config::NewsdeskConfig;
use crate::ingest::providers::{BraveMode, BraveSearchAdapter, GoogleNewsRssAdapter};
use crate::ingest::types::SearchRequest;
use crate::ingest::{run_chain, DynAdapter};
use crate::model::{Article, Query, DEFAULT_TITLE, DEFAULT_URL};
use crate::normalize::{fallback_articles, MissingTitlePolicy, PromptOptions, ResultNormalizer};

/// Produces the "today" literal used for undated fallback records.
pub type TodayFn = Arc<dyn Fn() -> String + Send + Sync>;

fn local_today() -> String {
    chrono::Local::now().format("%Y.%m.%d").to_string()
}

#[derive(Debug, Clone)]
struct Settings {
    region: String,
    language: String,
    recency_days: Option<u32>,
    max_results: usize,
    adapter_timeout: Duration,
    direct_search: bool,
    missing_title: MissingTitlePolicy,
}

pub struct Pipeline {
    topics: Vec<Query>,
    adapters: Vec<DynAdapter>,
    normalizer: ResultNormalizer,
    cache: ArticleCache,
    settings: Settings,
    today: TodayFn,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Wire real adapters and the configured model provider.
    pub fn from_config(cfg: &NewsdeskConfig) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.search.timeout_secs);
        let mut builder = Self::builder()
            .topics(cfg.topics.clone())
            .region(&cfg.search.region)
            .language(&cfg.search.language)
            .recency_days(cfg.recency_window())
            .max_results(cfg.search.max_results)
            .adapter_timeout(timeout)
            .model_timeout(Duration::from_secs(cfg.model.timeout_secs))
            .direct_search(cfg.search.direct_search)
            .missing_title(cfg.search.missing_title)
            .generator(build_generator(&cfg.model));
        if let Some(lang) = &cfg.model.output_language {
            builder = builder.output_language(lang);
        }

        for name in &cfg.search.adapters {
            let adapter: DynAdapter = match name.trim().to_lowercase().as_str() {
                "google_news" => Arc::new(GoogleNewsRssAdapter::new(timeout)),
                "brave" | "brave_web" => Arc::new(BraveSearchAdapter::new(
                    &cfg.search.brave_api_key,
                    BraveMode::Web,
                    timeout,
                )),
                "brave_news" => Arc::new(BraveSearchAdapter::new(
                    &cfg.search.brave_api_key,
                    BraveMode::News,
                    timeout,
                )),
                other => bail!("unknown adapter in config: {other}"),
            };
            builder = builder.adapter(adapter);
        }
        Ok(builder.build())
    }

    pub fn topics(&self) -> &[Query] {
        &self.topics
    }

    pub fn cache(&self) -> &ArticleCache {
        &self.cache
    }

    /// Cached articles for a topic, without fetching.
    pub fn cached(&self, topic_key: &str) -> Option<Vec<Article>> {
        self.cache.get(topic_key)
    }

    /// Articles for a configured topic. Unknown keys yield an empty list.
    pub async fn fetch(&self, topic_key: &str) -> Vec<Article> {
        match self.topics.iter().find(|t| t.key == topic_key) {
            Some(query) => self.fetch_query(query).await,
            None => {
                tracing::warn!(topic = topic_key, "unknown topic");
                Vec::new()
            }
        }
    }

    /// Articles for an arbitrary query, cached under `query.key`.
    #[tracing::instrument(skip_all, fields(topic = %query.key))]
    pub async fn fetch_query(&self, query: &Query) -> Vec<Article> {
        let t0 = Instant::now();
        let out = self
            .cache
            .get_or_fetch(&query.key, |generation| self.load(query, generation))
            .await;
        histogram!("newsdesk_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        out
    }

    /// Drop the cached entry and fetch again.
    pub async fn refresh(&self, topic_key: &str) -> Vec<Article> {
        self.invalidate(topic_key);
        self.fetch(topic_key).await
    }

    pub fn invalidate(&self, topic_key: &str) {
        tracing::info!(topic = topic_key, "invalidating");
        self.cache.invalidate(topic_key);
    }

    pub fn invalidate_all(&self) {
        tracing::info!("invalidating all topics");
        self.cache.invalidate_all();
    }

    async fn load(&self, query: &Query, generation: u64) -> Vec<Article> {
        let s = &self.settings;
        let request = SearchRequest {
            query: query.query.clone(),
            region: s.region.clone(),
            language: s.language.clone(),
            recency_days: s.recency_days,
            max_results: s.max_results,
        };

        let raw = run_chain(&self.adapters, &request, s.adapter_timeout).await;
        let articles = if raw.is_empty() {
            if !s.direct_search {
                tracing::info!(topic = %query.key, generation, "no raw results; skipping model");
                return Vec::new();
            }
            match self.normalizer.search_direct(query).await {
                Ok(articles) => articles,
                Err(e) => {
                    tracing::warn!(topic = %query.key, error = %e, "direct search failed");
                    Vec::new()
                }
            }
        } else {
            match self.normalizer.normalize(query, &raw).await {
                Ok(articles) => articles,
                Err(e) => {
                    tracing::warn!(topic = %query.key, error = %e, raw = raw.len(), "normalization failed; mapping raw records");
                    counter!("newsdesk_fallback_total").increment(1);
                    fallback_articles(&raw, &(self.today)(), s.missing_title)
                }
            }
        };

        let ranked = rank_articles(articles, s.max_results);
        tracing::info!(topic = %query.key, generation, count = ranked.len(), "fetched");
        ranked
    }
}

/// Drop repeats: same real url, or same title ignoring case. First one wins.
pub fn dedup_articles(articles: Vec<Article>) -> Vec<Article> {
    let mut urls = HashSet::new();
    let mut titles = HashSet::new();
    articles
        .into_iter()
        .filter(|a| {
            let url_seen = a.url != DEFAULT_URL && !urls.insert(a.url.clone());
            let title_seen = a.title != DEFAULT_TITLE && !titles.insert(a.title.to_lowercase());
            !(url_seen || title_seen)
        })
        .collect()
}

/// Newest first; undated or unparsable dates go last. Stable.
pub fn sort_by_date_desc(articles: &mut [Article]) {
    articles.sort_by(|a, b| match (a.has_sortable_date(), b.has_sortable_date()) {
        (true, true) => b.date.cmp(&a.date),
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        (false, false) => std::cmp::Ordering::Equal,
    });
}

/// Sort newest first, drop repeats, then cut to `max_results`.
///
/// Sorting goes first so the newest copy of a repeated story is the one kept.
pub fn rank_articles(mut articles: Vec<Article>, max_results: usize) -> Vec<Article> {
    sort_by_date_desc(&mut articles);
    let mut out = dedup_articles(articles);
    out.truncate(max_results);
    out
}

/// Assembles a [`Pipeline`]; every setting has a default.
pub struct PipelineBuilder {
    topics: Vec<Query>,
    adapters: Vec<DynAdapter>,
    generator: Option<DynGenerator>,
    settings: Settings,
    model_timeout: Duration,
    output_language: Option<String>,
    today: TodayFn,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            adapters: Vec::new(),
            generator: None,
            settings: Settings {
                region: "kr".into(),
                language: "ko".into(),
                recency_days: Some(7),
                max_results: 6,
                adapter_timeout: Duration::from_secs(15),
                direct_search: true,
                missing_title: MissingTitlePolicy::default(),
            },
            model_timeout: Duration::from_secs(60),
            output_language: None,
            today: Arc::new(local_today),
        }
    }
}

impl PipelineBuilder {
    pub fn topic(mut self, query: Query) -> Self {
        self.topics.push(query);
        self
    }

    pub fn topics(mut self, topics: Vec<Query>) -> Self {
        self.topics = topics;
        self
    }

    /// Appended to the end of the chain.
    pub fn adapter(mut self, adapter: DynAdapter) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn generator(mut self, generator: DynGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn region(mut self, region: &str) -> Self {
        self.settings.region = region.to_string();
        self
    }

    pub fn language(mut self, language: &str) -> Self {
        self.settings.language = language.to_string();
        self
    }

    pub fn recency_days(mut self, days: Option<u32>) -> Self {
        self.settings.recency_days = days;
        self
    }

    pub fn max_results(mut self, n: usize) -> Self {
        self.settings.max_results = n.max(1);
        self
    }

    pub fn adapter_timeout(mut self, timeout: Duration) -> Self {
        self.settings.adapter_timeout = timeout;
        self
    }

    pub fn model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn direct_search(mut self, enabled: bool) -> Self {
        self.settings.direct_search = enabled;
        self
    }

    pub fn missing_title(mut self, policy: MissingTitlePolicy) -> Self {
        self.settings.missing_title = policy;
        self
    }

    pub fn output_language(mut self, language: &str) -> Self {
        self.output_language = Some(language.to_string());
        self
    }

    pub fn today<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.today = Arc::new(f);
        self
    }

    pub fn build(self) -> Pipeline {
        crate::telemetry::ensure_metrics_described();
        // without a model every cleanup fails over to the raw mapping
        let generator = self
            .generator
            .unwrap_or_else(|| Arc::new(DisabledGenerator));
        let opts = PromptOptions {
            max_results: self.settings.max_results,
            recency_days: self.settings.recency_days,
            output_language: self.output_language,
        };
        Pipeline {
            topics: self.topics,
            adapters: self.adapters,
            normalizer: ResultNormalizer::new(generator, self.model_timeout, opts),
            cache: ArticleCache::new(),
            settings: self.settings,
            today: self.today,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dated(title: &str, date: &str) -> Article {
        Article::from_parts(Some(title), None, None, Some(date), None)
    }

    #[test]
    fn sort_puts_newest_first_and_undated_last() {
        let mut v = vec![dated("a", "2024.05.01"), dated("b", "2024.05.20"), dated("c", "")];
        sort_by_date_desc(&mut v);
        let dates: Vec<&str> = v.iter().map(|a| a.date.as_str()).collect();
        assert_eq!(dates, ["2024.05.20", "2024.05.01", ""]);
    }

    #[test]
    fn sort_is_stable_among_ties_and_unparsable_dates() {
        let mut v = vec![
            dated("x", "3 days ago"),
            dated("p", "2024.05.01"),
            dated("y", ""),
            dated("q", "2024.05.01"),
        ];
        sort_by_date_desc(&mut v);
        let titles: Vec<&str> = v.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["p", "q", "x", "y"]);
    }

    #[test]
    fn dedup_matches_url_or_case_folded_title() {
        let v = vec![
            Article::from_parts(Some("Budget"), Some("https://a/1"), None, None, None),
            Article::from_parts(Some("Other"), Some("https://a/1"), None, None, None),
            Article::from_parts(Some("BUDGET"), Some("https://a/2"), None, None, None),
            Article::from_parts(Some("Fresh"), None, None, None, None),
            Article::from_parts(Some("Fresh 2"), None, None, None, None),
            Article::from_parts(None, None, None, None, None),
            Article::from_parts(None, None, None, None, None),
        ];
        let out = dedup_articles(v);
        let titles: Vec<&str> = out.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["Budget", "Fresh", "Fresh 2", DEFAULT_TITLE, DEFAULT_TITLE]);
    }

    #[test]
    fn rank_truncates_after_sorting() {
        let v = (1..=9).map(|d| dated(&format!("t{d}"), &format!("2024.05.0{d}"))).collect();
        let out = rank_articles(v, 3);
        let dates: Vec<&str> = out.iter().map(|a| a.date.as_str()).collect();
        assert_eq!(dates, ["2024.05.09", "2024.05.08", "2024.05.07"]);
    }

    #[test]
    fn rank_keeps_the_newest_copy_of_a_repeat() {
        let v = vec![
            Article::from_parts(Some("Budget"), Some("https://a/1"), None, Some("2024.05.02"), None),
            Article::from_parts(Some("Other"), Some("https://a/3"), None, Some("2024.05.04"), None),
            Article::from_parts(Some("budget update"), Some("https://a/1"), None, Some("2024.05.10"), None),
        ];
        let out = rank_articles(v, 5);
        let titles: Vec<&str> = out.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["budget update", "Other"]);
        assert_eq!(out[0].date, "2024.05.10");
    }
}
