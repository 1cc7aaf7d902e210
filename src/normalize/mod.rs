// src/normalize/mod.rs
//! # ResultNormalizer
//! Turns raw search records, or a direct model search, into canonical
//! [`Article`]s. The model is asked for a flat JSON array; [`extract`] digs
//! that array out of whatever text comes back and [`fallback`] maps raw
//! records directly when the model path fails.

pub mod extract;
pub mod fallback;

pub use extract::{articles_from_values, extract_json_array, parse_articles, strip_fences};
pub use fallback::{fallback_articles, MissingTitlePolicy};

use std::time::{Duration, Instant};

use metrics::{counter, histogram};

use crate::ai_adapter::DynGenerator;
use crate::error::{NewsError, Result};
use crate::model::{Article, Query, RawResult};

/// Knobs that end up in the prompt text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOptions {
    pub max_results: usize,
    pub recency_days: Option<u32>,
    /// e.g. "Korean". `None` keeps whatever language the sources use.
    pub output_language: Option<String>,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            max_results: 6,
            recency_days: Some(7),
            output_language: None,
        }
    }
}

fn output_contract(opts: &PromptOptions) -> String {
    let headline = match &opts.output_language {
        Some(lang) => format!("A clear, concise headline in {lang} (NOT a URL)."),
        None => "A clear, concise headline (NOT a URL).".to_string(),
    };
    let summary = match &opts.output_language {
        Some(lang) => format!("A 1-sentence summary in {lang}."),
        None => "A 1-sentence summary.".to_string(),
    };
    format!(
        "Return at most {n} items, sorted by date descending (newest first).\n\
         Return ONLY a raw JSON array (no prose, no markdown code fences) of objects with exactly these keys:\n\
         - \"title\": {headline}\n\
         - \"date\": The publication date in 'YYYY.MM.DD' format.\n\
         - \"source\": The name of the news outlet.\n\
         - \"url\": The direct link to the article.\n\
         - \"snippet\": {summary}\n",
        n = opts.max_results,
    )
}

/// Prompt asking the model to clean up already-retrieved records.
pub fn cleanup_prompt(query: &Query, raw: &[RawResult], opts: &PromptOptions) -> String {
    let records = serde_json::to_string_pretty(raw).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Below are raw search results for the news topic \"{q}\".\n\
         Select the most relevant and authoritative articles, drop duplicates and anything unrelated, \
         and rewrite them into the required shape. Use only information present in the records.\n\n\
         {contract}\n\
         Raw results:\n{records}\n",
        q = query.query,
        contract = output_contract(opts),
    )
}

/// Prompt asking a search-enabled model to find the articles itself.
pub fn search_prompt(query: &Query, opts: &PromptOptions) -> String {
    let window = match opts.recency_days {
        Some(d) => format!(" (last {d} days)"),
        None => String::new(),
    };
    format!(
        "Search for the latest{window} news articles about \"{q}\".\n\
         Select the {n} most relevant and authoritative articles.\n\n\
         {contract}",
        q = query.query,
        n = opts.max_results,
        contract = output_contract(opts),
    )
}

/// Model-backed normalization with a hard time bound per call.
pub struct ResultNormalizer {
    generator: DynGenerator,
    timeout: Duration,
    opts: PromptOptions,
}

impl ResultNormalizer {
    pub fn new(generator: DynGenerator, timeout: Duration, opts: PromptOptions) -> Self {
        Self {
            generator,
            timeout,
            opts,
        }
    }

    pub fn options(&self) -> &PromptOptions {
        &self.opts
    }

    /// Clean `raw` through the model.
    ///
    /// An empty `raw` yields an empty list without a model call. A model that
    /// answers with an empty array for non-empty input counts as malformed so
    /// the caller falls back to the raw records.
    pub async fn normalize(&self, query: &Query, raw: &[RawResult]) -> Result<Vec<Article>> {
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        let prompt = cleanup_prompt(query, raw, &self.opts);
        let text = self.call(&prompt, false).await?;
        let articles = parse_articles(&text).inspect_err(|e| self.record_failure(e))?;
        if articles.is_empty() {
            let err = NewsError::malformed("model returned no articles for non-empty input");
            self.record_failure(&err);
            return Err(err);
        }
        Ok(articles)
    }

    /// Let the model search and emit the articles itself.
    pub async fn search_direct(&self, query: &Query) -> Result<Vec<Article>> {
        let prompt = search_prompt(query, &self.opts);
        let text = self.call(&prompt, true).await?;
        parse_articles(&text).inspect_err(|e| self.record_failure(e))
    }

    async fn call(&self, prompt: &str, web_search: bool) -> Result<String> {
        let backend = self.generator.name();
        let t0 = Instant::now();
        let out = match tokio::time::timeout(self.timeout, self.generator.generate(prompt, web_search)).await {
            Ok(r) => r,
            Err(_) => Err(NewsError::unavailable(
                backend,
                format!("no answer within {}s", self.timeout.as_secs()),
            )),
        };
        histogram!("newsdesk_model_ms", "backend" => backend).record(t0.elapsed().as_secs_f64() * 1_000.0);
        if let Err(e) = &out {
            tracing::warn!(error = %e, backend, web_search, "model call failed");
            self.record_failure(e);
        }
        out
    }

    fn record_failure(&self, e: &NewsError) {
        counter!("newsdesk_normalize_failures_total", "kind" => e.kind()).increment(1);
    }
}
