// src/normalize/fallback.rs
use serde::{Deserialize, Serialize};

use crate::model::{Article, ArticleField, RawResult};

/// What to do with a raw record that has no resolvable title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingTitlePolicy {
    /// Leave the record out.
    #[default]
    Drop,
    /// Keep it under the "Untitled" sentinel.
    Sentinel,
}

/// Deterministic raw → article mapping used when model cleanup fails.
///
/// Never fails. The output is at most as long as `raw`. `today` stands in for
/// records that carry no date-like field at all.
pub fn fallback_articles(raw: &[RawResult], today: &str, policy: MissingTitlePolicy) -> Vec<Article> {
    raw.iter()
        .filter_map(|r| {
            let title = r.resolve(ArticleField::Title);
            if title.is_none() && policy == MissingTitlePolicy::Drop {
                tracing::debug!(adapter = r.adapter, "dropping raw record without title");
                return None;
            }
            let date = r.resolve(ArticleField::Date).or(Some(today));
            Some(Article::from_parts(
                title,
                r.resolve(ArticleField::Url),
                r.resolve(ArticleField::Source),
                date,
                r.resolve(ArticleField::Snippet),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DEFAULT_TITLE;

    fn sample() -> Vec<RawResult> {
        vec![
            RawResult::new("t")
                .with("headline", "Grant call opens")
                .with("href", "https://a/1")
                .with("publisher", "Yonhap")
                .with("published_at", "2024-05-20T07:00:00+09:00")
                .with("summary", "Deadline in June"),
            RawResult::new("t").with("link", "https://a/2").with("body", "no title"),
            RawResult::new("t").with("name", "Dateless"),
        ]
    }

    #[test]
    fn aliases_resolve_and_today_fills_missing_dates() {
        let out = fallback_articles(&sample(), "2024.05.21", MissingTitlePolicy::Drop);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "Grant call opens");
        assert_eq!(out[0].url, "https://a/1");
        assert_eq!(out[0].source, "Yonhap");
        assert_eq!(out[0].date, "2024.05.20");
        assert_eq!(out[0].snippet, "Deadline in June");
        assert_eq!(out[1].title, "Dateless");
        assert_eq!(out[1].date, "2024.05.21");
        assert_eq!(out[1].url, "#");
    }

    #[test]
    fn sentinel_policy_keeps_untitled_records() {
        let out = fallback_articles(&sample(), "2024.05.21", MissingTitlePolicy::Sentinel);
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].title, DEFAULT_TITLE);
        assert_eq!(out[1].url, "https://a/2");
        assert_eq!(out[1].snippet, "no title");
    }

    #[test]
    fn policy_parses_from_lowercase() {
        #[derive(Deserialize)]
        struct W {
            p: MissingTitlePolicy,
        }
        let w: W = toml::from_str("p = \"sentinel\"").unwrap();
        assert_eq!(w.p, MissingTitlePolicy::Sentinel);
    }
}
