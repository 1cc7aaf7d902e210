//! # Model
//! Topic descriptors, loosely-typed raw search records and the canonical
//! [`Article`] every code path must end up producing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_TITLE: &str = "Untitled";
pub const DEFAULT_URL: &str = "#";
pub const DEFAULT_SOURCE: &str = "News";

/// A configured topic: the search phrase plus how the shell labels it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Cache key, e.g. `SCI_TECH`.
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub short_label: String,
    /// Search phrase sent to the backends.
    pub query: String,
}

impl Query {
    pub fn new(key: &str, label: &str, query: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            short_label: label.to_string(),
            query: query.to_string(),
        }
    }
}

/// Canonical output record. Every field is always populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    pub source: String,
    /// `YYYY.MM.DD`, or empty when unknown.
    pub date: String,
    pub snippet: String,
}

impl Article {
    /// Build an article from optional parts, substituting the defaults and
    /// cleaning the date.
    pub fn from_parts(
        title: Option<&str>,
        url: Option<&str>,
        source: Option<&str>,
        date: Option<&str>,
        snippet: Option<&str>,
    ) -> Self {
        Self {
            title: non_blank(title).unwrap_or(DEFAULT_TITLE).to_string(),
            url: non_blank(url).unwrap_or(DEFAULT_URL).to_string(),
            source: non_blank(source).unwrap_or(DEFAULT_SOURCE).to_string(),
            date: non_blank(date).map(clean_date).unwrap_or_default(),
            snippet: non_blank(snippet).unwrap_or_default().to_string(),
        }
    }

    /// True when the article carries a date the sorter can order.
    pub fn has_sortable_date(&self) -> bool {
        is_sortable_date(&self.date)
    }
}

/// Canonical fields with their alias tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArticleField {
    Title,
    Url,
    Source,
    Date,
    Snippet,
}

impl ArticleField {
    pub const ALL: [ArticleField; 5] = [
        ArticleField::Title,
        ArticleField::Url,
        ArticleField::Source,
        ArticleField::Date,
        ArticleField::Snippet,
    ];

    /// Raw keys that may carry this field, in resolution order.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Title => &["title", "headline", "name"],
            Self::Url => &["url", "href", "link"],
            Self::Source => &["source", "site", "publisher", "hostname"],
            Self::Date => &[
                "date",
                "published",
                "pubDate",
                "published_at",
                "page_age",
                "age",
            ],
            Self::Snippet => &["snippet", "body", "description", "summary"],
        }
    }

    /// Key used in the model output contract.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Url => "url",
            Self::Source => "source",
            Self::Date => "date",
            Self::Snippet => "snippet",
        }
    }
}

/// Record returned by a source adapter. Field names depend on the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawResult {
    /// Adapter that produced the record.
    #[serde(skip)]
    pub adapter: &'static str,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl RawResult {
    pub fn new(adapter: &'static str) -> Self {
        Self {
            adapter,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style insert; blank values are skipped.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.fields.insert(key.to_string(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// First non-blank alias for `field`.
    pub fn resolve(&self, field: ArticleField) -> Option<&str> {
        field
            .aliases()
            .iter()
            .find_map(|alias| non_blank(self.get(alias)))
    }
}

fn non_blank(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

static RE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})[-./](\d{2})[-./](\d{2})$").expect("date regex"));
static RE_SORTABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}\.\d{2}\.\d{2}$").expect("sortable date regex"));

/// Trim, cut to the first 10 characters and, when the result is a
/// year-month-day date, rewrite the separators to dots.
///
/// `"2024-05-21T09:30:00Z"` becomes `"2024.05.21"`; `"3 days ago"` stays as is.
pub fn clean_date(raw: &str) -> String {
    let head: String = raw.trim().chars().take(10).collect();
    let head = head.trim_end();
    match RE_DATE.captures(head) {
        Some(c) => format!("{}.{}.{}", &c[1], &c[2], &c[3]),
        None => head.to_string(),
    }
}

/// `YYYY.MM.DD`, fixed width, so lexicographic order is date order.
pub fn is_sortable_date(s: &str) -> bool {
    RE_SORTABLE.is_match(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_every_missing_field() {
        let a = Article::from_parts(None, None, None, None, None);
        assert_eq!(a.title, DEFAULT_TITLE);
        assert_eq!(a.url, "#");
        assert_eq!(a.source, "News");
        assert_eq!(a.date, "");
        assert_eq!(a.snippet, "");
    }

    #[test]
    fn blank_values_count_as_missing() {
        let a = Article::from_parts(Some("  "), Some(""), Some(" "), Some(" "), Some(""));
        assert_eq!(a.title, DEFAULT_TITLE);
        assert_eq!(a.url, "#");
        assert_eq!(a.source, "News");
    }

    #[test]
    fn clean_date_truncates_and_normalizes() {
        assert_eq!(clean_date("2024-05-21T09:30:00Z"), "2024.05.21");
        assert_eq!(clean_date("2024/05/21"), "2024.05.21");
        assert_eq!(clean_date("2024.05.21"), "2024.05.21");
        assert_eq!(clean_date(" 2024.05.21 "), "2024.05.21");
        assert_eq!(clean_date("3 days ago"), "3 days ago");
        assert_eq!(clean_date("yesterday afternoon"), "yesterday");
    }

    #[test]
    fn clean_date_counts_chars_not_bytes() {
        assert_eq!(clean_date("2024년 5월 21일 오전"), "2024년 5월 2");
    }

    #[test]
    fn sortable_date_shape() {
        assert!(is_sortable_date("2024.05.01"));
        assert!(!is_sortable_date("2024-05-01"));
        assert!(!is_sortable_date(""));
        assert!(!is_sortable_date("May 1"));
    }

    #[test]
    fn resolve_walks_alias_table_in_order() {
        let r = RawResult::new("test")
            .with("link", "https://b.example")
            .with("href", "https://a.example")
            .with("headline", "Headline");
        assert_eq!(r.resolve(ArticleField::Url), Some("https://a.example"));
        assert_eq!(r.resolve(ArticleField::Title), Some("Headline"));
        assert_eq!(r.resolve(ArticleField::Source), None);
    }

    #[test]
    fn raw_result_serializes_flat() {
        let r = RawResult::new("test").with("title", "A").with("url", "u");
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"title":"A","url":"u"}"#);
    }
}
