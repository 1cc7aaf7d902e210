// src/config/mod.rs
//! Runtime configuration: topics, search defaults and model provider.
//!
//! Loaded from TOML (`config/newsdesk.toml`, or `$NEWSDESK_CONFIG_PATH`).
//! `api_key = "ENV"` means: read the key from the provider's environment variable.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::model::Query;
use crate::normalize::MissingTitlePolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config/newsdesk.toml";
pub const ENV_CONFIG_PATH: &str = "NEWSDESK_CONFIG_PATH";

const MAX_RESULTS_CAP: usize = 20;

fn default_region() -> String {
    "kr".to_string()
}
fn default_language() -> String {
    "ko".to_string()
}
fn default_recency_days() -> u32 {
    7
}
fn default_max_results() -> usize {
    6
}
fn default_adapters() -> Vec<String> {
    vec!["google_news".to_string(), "brave_web".to_string()]
}
fn default_true() -> bool {
    true
}
fn default_adapter_timeout() -> u64 {
    15
}
fn default_model_timeout() -> u64 {
    60
}
fn default_env() -> String {
    "ENV".to_string()
}
fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// 0 disables the recency restriction.
    #[serde(default = "default_recency_days")]
    pub recency_days: u32,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Adapter chain, in order: `google_news`, `brave_web`, `brave_news`.
    #[serde(default = "default_adapters")]
    pub adapters: Vec<String>,
    /// Ask the model to search by itself when the whole chain comes back empty.
    #[serde(default = "default_true")]
    pub direct_search: bool,
    #[serde(default = "default_adapter_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_env")]
    pub brave_api_key: String,
    #[serde(default)]
    pub missing_title: MissingTitlePolicy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            language: default_language(),
            recency_days: default_recency_days(),
            max_results: default_max_results(),
            adapters: default_adapters(),
            direct_search: true,
            timeout_secs: default_adapter_timeout(),
            brave_api_key: default_env(),
            missing_title: MissingTitlePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// "openai" | "gemini" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// OpenAI only: model used when web search is requested.
    #[serde(default)]
    pub search_model: Option<String>,
    #[serde(default = "default_env")]
    pub api_key: String,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
    /// Language the headlines and summaries should be written in.
    #[serde(default)]
    pub output_language: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            search_model: None,
            api_key: default_env(),
            timeout_secs: default_model_timeout(),
            output_language: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsdeskConfig {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default = "default_topics")]
    pub topics: Vec<Query>,
}

impl Default for NewsdeskConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            model: ModelConfig::default(),
            topics: default_topics(),
        }
    }
}

/// The four sections the digest ships with.
pub fn default_topics() -> Vec<Query> {
    vec![
        Query {
            key: "NRF_NEWS".into(),
            label: "한국연구재단 주요 기사".into(),
            short_label: "재단소식".into(),
            query: "한국연구재단 최근 주요 뉴스 보도자료 성과".into(),
        },
        Query {
            key: "SCI_TECH".into(),
            label: "과학기술분야 동향".into(),
            short_label: "과기동향".into(),
            query: "대한민국 과학기술 R&D 정책 기술 개발 최신 동향 뉴스".into(),
        },
        Query {
            key: "HUMANITIES".into(),
            label: "인문사회분야 동향".into(),
            short_label: "인문동향".into(),
            query: "대한민국 인문사회 학술 연구 지원 정책 최신 뉴스 동향".into(),
        },
        Query {
            key: "UNI_SUPPORT".into(),
            label: "대학재정지원사업 동향".into(),
            short_label: "대학지원".into(),
            query: "교육부 대학재정지원사업 RISE 사업 글로컬대학 LINC 3.0 BK21 최신 뉴스".into(),
        },
    ]
}

impl NewsdeskConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&data).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: NewsdeskConfig = toml::from_str(s)?;
        cfg.finalize()
    }

    /// Load using env var + fallbacks:
    /// 1) $NEWSDESK_CONFIG_PATH (must exist)
    /// 2) config/newsdesk.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            return Self::load_from_file(&pb);
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from_file(&default);
        }
        Self::default().finalize()
    }

    /// Normalize, resolve keys from the environment and validate.
    pub fn finalize(mut self) -> Result<Self> {
        self.model.provider = self.model.provider.trim().to_lowercase();
        self.search.region = self.search.region.trim().to_lowercase();
        self.search.language = self.search.language.trim().to_lowercase();

        if self.model.api_key.trim().eq_ignore_ascii_case("env") {
            self.model.api_key = match self.model.provider.as_str() {
                "openai" => env_key(&["OPENAI_API_KEY"]),
                "gemini" => env_key(&["GEMINI_API_KEY", "API_KEY"]),
                other => bail!("Unsupported provider in config: {other}"),
            };
        }
        if self.search.brave_api_key.trim().eq_ignore_ascii_case("env") {
            self.search.brave_api_key = env_key(&["BRAVE_API_KEY"]);
        }

        self.search.max_results = self.search.max_results.clamp(1, MAX_RESULTS_CAP);
        self.search.timeout_secs = self.search.timeout_secs.max(1);
        self.model.timeout_secs = self.model.timeout_secs.max(1);

        let mut seen = HashSet::new();
        for t in &self.topics {
            if t.key.trim().is_empty() || t.query.trim().is_empty() {
                return Err(anyhow!("topic entries need a non-empty key and query"));
            }
            if !seen.insert(t.key.as_str()) {
                return Err(anyhow!("duplicate topic key {}", t.key));
            }
        }
        Ok(self)
    }

    pub fn topic(&self, key: &str) -> Option<&Query> {
        self.topics.iter().find(|t| t.key == key)
    }

    /// `recency_days = 0` means no window.
    pub fn recency_window(&self) -> Option<u32> {
        (self.search.recency_days > 0).then_some(self.search.recency_days)
    }
}

fn env_key(names: &[&str]) -> String {
    for n in names {
        if let Ok(v) = env::var(n) {
            if !v.trim().is_empty() {
                return v;
            }
        }
    }
    tracing::warn!(vars = ?names, "API key not found in environment");
    String::new()
}
