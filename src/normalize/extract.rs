// src/normalize/extract.rs
//! Locating a JSON array inside free-form model output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{NewsError, Result};
use crate::model::{Article, ArticleField};

static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("fence regex"));

/// Remove markdown code-fence markers (```` ``` ```` and ```` ```json ````).
pub fn strip_fences(text: &str) -> String {
    RE_FENCE.replace_all(text, "").trim().to_string()
}

/// Find and decode the JSON array in `text`.
///
/// Tried in order: the whole text after fence stripping, each balanced
/// top-level `[...]` span from left to right, and finally the slice between
/// the first `[` and the last `]`. Only arrays holding at least one object
/// count, so citation markers like `[1]` in the prose are skipped. A bare
/// `[]` answer is an empty result; anything else is a `MalformedResponse`.
pub fn extract_json_array(text: &str) -> Result<Vec<Value>> {
    let body = strip_fences(text);
    if body.is_empty() {
        return Err(NewsError::malformed("empty model output"));
    }

    if let Some(values) = parse_records(&body) {
        return Ok(values);
    }

    let mut from = 0;
    while let Some(offset) = body[from..].find('[') {
        let start = from + offset;
        if let Some(end) = balanced_end(&body, start) {
            if let Some(values) = parse_records(&body[start..=end]) {
                return Ok(values);
            }
        }
        from = start + 1;
    }

    if let (Some(start), Some(end)) = (body.find('['), body.rfind(']')) {
        if start < end {
            if let Some(values) = parse_records(&body[start..=end]) {
                return Ok(values);
            }
        }
    }

    if parse_array(&body).is_some_and(|v| v.is_empty()) {
        return Ok(Vec::new());
    }
    Err(NewsError::malformed("no JSON array of objects found in model output"))
}

fn parse_array(s: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(s.trim()) {
        Ok(Value::Array(values)) => Some(values),
        _ => None,
    }
}

/// An array with at least one object in it.
fn parse_records(s: &str) -> Option<Vec<Value>> {
    parse_array(s).filter(|values| values.iter().any(Value::is_object))
}

/// Byte index of the `]` closing the `[` at `start`, skipping brackets that
/// sit inside JSON strings.
fn balanced_end(s: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Map decoded values onto articles. Non-object elements are skipped;
/// numbers and booleans are stringified; defaults and date cleanup apply.
pub fn articles_from_values(values: Vec<Value>) -> Vec<Article> {
    values
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| {
            let field = |f: ArticleField| -> Option<String> {
                f.aliases().iter().find_map(|alias| match obj.get(*alias)? {
                    Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
            };
            let title = field(ArticleField::Title);
            let url = field(ArticleField::Url);
            let source = field(ArticleField::Source);
            let date = field(ArticleField::Date);
            let snippet = field(ArticleField::Snippet);
            Article::from_parts(
                title.as_deref(),
                url.as_deref(),
                source.as_deref(),
                date.as_deref(),
                snippet.as_deref(),
            )
        })
        .collect()
}

/// `extract_json_array` followed by `articles_from_values`.
pub fn parse_articles(text: &str) -> Result<Vec<Article>> {
    extract_json_array(text).map(articles_from_values)
}
