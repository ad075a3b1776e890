//! Text and page-metadata extraction

use async_trait::async_trait;
use chromiumoxide::page::Page;

use super::{eval_json, Extractor};
use crate::config::ExtractionConfig;
use crate::error::SpiderResult;
use crate::result::ExtractorKind;

/// Reads visible text plus document metadata in one evaluation. Content
/// selection happens on a detached clone of the body so sibling extractors
/// never see a mutated page.
const TEXT_SCRIPT: &str = r#"
((contentSelectors, excludeSelectors) => {
    const meta = {};
    meta.title = document.title || '';
    const byName = (name) => {
        const el = document.querySelector(`meta[name="${name}"]`);
        return el ? el.content : '';
    };
    meta.description = byName('description');
    meta.keywords = byName('keywords');
    meta.author = byName('author');
    meta.viewport = byName('viewport');
    meta.language = document.documentElement.lang || '';
    meta.charset = document.characterSet || '';

    let content = '';
    if (contentSelectors.length > 0) {
        const parts = [];
        for (const selector of contentSelectors) {
            document.querySelectorAll(selector).forEach(el => {
                parts.push(el.innerText || '');
            });
        }
        content = parts.join('\n');
    } else if (excludeSelectors.length > 0) {
        const clone = document.body.cloneNode(true);
        for (const selector of excludeSelectors) {
            clone.querySelectorAll(selector).forEach(el => el.remove());
        }
        content = clone.textContent || '';
    } else {
        content = document.body ? document.body.innerText : '';
    }

    return { content: content, metadata: meta };
})
"#;

pub struct TextExtractor;

#[async_trait]
impl Extractor for TextExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Text
    }

    async fn extract(
        &self,
        page: &Page,
        config: &ExtractionConfig,
    ) -> SpiderResult<serde_json::Value> {
        let script = format!(
            "({})({}, {})",
            TEXT_SCRIPT.trim(),
            serde_json::to_string(&config.content_selectors).unwrap_or_else(|_| "[]".into()),
            serde_json::to_string(&config.exclude_selectors).unwrap_or_else(|_| "[]".into()),
        );
        let raw = eval_json(page, &script).await?;
        Ok(process_text(raw, config))
    }
}

/// Pure post-processing: whitespace normalization per config.
pub(crate) fn process_text(mut raw: serde_json::Value, config: &ExtractionConfig) -> serde_json::Value {
    if config.normalize_whitespace {
        if let Some(content) = raw.get("content").and_then(|c| c.as_str()) {
            let normalized = normalize_whitespace(content);
            raw["content"] = serde_json::Value::String(normalized);
        }
    }
    raw
}

/// Collapse runs of whitespace into single spaces, preserving paragraph
/// breaks as newlines.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .enumerate()
    {
        if i > 0 {
            out.push('\n');
        }
        let mut last_was_space = false;
        for c in line.chars() {
            if c.is_whitespace() {
                if !last_was_space {
                    out.push(' ');
                }
                last_was_space = true;
            } else {
                out.push(c);
                last_was_space = false;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_whitespace_runs() {
        assert_eq!(
            normalize_whitespace("hello   world\n\n\n  second   line  \n"),
            "hello world\nsecond line"
        );
    }

    #[test]
    fn process_respects_normalize_flag() {
        let raw = json!({"content": "a    b", "metadata": {}});
        let config = ExtractionConfig::default();
        assert_eq!(process_text(raw.clone(), &config)["content"], "a b");

        let config = ExtractionConfig {
            normalize_whitespace: false,
            ..Default::default()
        };
        assert_eq!(process_text(raw, &config)["content"], "a    b");
    }

    #[test]
    fn word_count_survives_normalization() {
        let words: Vec<String> = (0..120).map(|i| format!("w{i}")).collect();
        let raw = json!({"content": words.join("   \n  "), "metadata": {}});
        let processed = process_text(raw, &ExtractionConfig::default());
        let count = processed["content"]
            .as_str()
            .unwrap()
            .split_whitespace()
            .count();
        assert_eq!(count, 120);
    }
}
