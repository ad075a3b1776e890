//! Link extraction and classification

use async_trait::async_trait;
use chromiumoxide::page::Page;
use serde_json::{json, Value};
use std::collections::HashSet;
use url::Url;

use super::{eval_json, Extractor};
use crate::config::ExtractionConfig;
use crate::error::SpiderResult;
use crate::result::ExtractorKind;

const LINKS_SCRIPT: &str = r#"
(() => {
    const links = [];
    document.querySelectorAll('a[href]').forEach(link => {
        links.push({
            text: (link.textContent || '').trim(),
            href: link.getAttribute('href') || '',
            title: link.title || '',
            rel: link.rel || '',
            target: link.target || '',
            in_navigation: !!link.closest('nav, .nav, .navigation, .menu, header, .header'),
            in_main_content: !!link.closest('main, .main, .content, article, .article'),
        });
    });
    return links;
})()
"#;

const MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "mp4", "webm", "mp3", "wav", "pdf", "zip",
];

pub struct LinkExtractor;

#[async_trait]
impl Extractor for LinkExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Links
    }

    async fn extract(
        &self,
        page: &Page,
        config: &ExtractionConfig,
    ) -> SpiderResult<serde_json::Value> {
        let raw = eval_json(page, LINKS_SCRIPT).await?;
        let base_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        Ok(process_links(raw, &base_url, config))
    }
}

/// Pure post-processing over the raw anchor list: absolutize against the
/// base URL, drop invalid and filtered entries, dedup, classify
/// internal/external, cap at max_links.
pub(crate) fn process_links(raw: Value, base_url: &str, config: &ExtractionConfig) -> Value {
    let base = Url::parse(base_url).ok();
    let base_host = base.as_ref().and_then(|b| b.host_str().map(str::to_string));

    let mut seen: HashSet<String> = HashSet::new();
    let mut links = Vec::new();
    let mut internal = 0usize;
    let mut external = 0usize;

    for item in raw.as_array().cloned().unwrap_or_default() {
        let href = item.get("href").and_then(|v| v.as_str()).unwrap_or("");
        if href.is_empty() {
            continue;
        }

        let absolute = match &base {
            Some(base) => match base.join(href) {
                Ok(joined) => joined,
                Err(_) => continue,
            },
            None => match Url::parse(href) {
                Ok(parsed) => parsed,
                Err(_) => continue,
            },
        };
        if absolute.scheme() != "http" && absolute.scheme() != "https" {
            continue;
        }

        let absolute_str = absolute.to_string();
        if config.deduplicate && !seen.insert(absolute_str.clone()) {
            continue;
        }
        if config
            .link_filters
            .iter()
            .any(|pattern| absolute_str.contains(pattern.as_str()))
        {
            continue;
        }

        let domain = absolute.host_str().unwrap_or("").to_string();
        let is_internal = base_host.as_deref() == Some(domain.as_str());
        if is_internal && !config.include_internal_links {
            continue;
        }
        if !is_internal && !config.include_external_links {
            continue;
        }

        let extension = file_extension(absolute.path());
        let is_media = extension
            .as_deref()
            .map(|e| MEDIA_EXTENSIONS.contains(&e))
            .unwrap_or(false);

        if is_internal {
            internal += 1;
        } else {
            external += 1;
        }

        links.push(json!({
            "url": absolute_str,
            "text": item.get("text").cloned().unwrap_or(Value::String(String::new())),
            "title": item.get("title").cloned().unwrap_or(Value::String(String::new())),
            "rel": item.get("rel").cloned().unwrap_or(Value::String(String::new())),
            "in_navigation": item.get("in_navigation").cloned().unwrap_or(Value::Bool(false)),
            "in_main_content": item.get("in_main_content").cloned().unwrap_or(Value::Bool(false)),
            "domain": domain,
            "is_internal": is_internal,
            "is_media": is_media,
        }));

        if let Some(max) = config.max_links {
            if links.len() >= max {
                break;
            }
        }
    }

    json!({
        "links": links,
        "total_links": links.len(),
        "internal_links": internal,
        "external_links": external,
    })
}

fn file_extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_links(hrefs: &[&str]) -> Value {
        Value::Array(
            hrefs
                .iter()
                .map(|href| json!({"text": "link", "href": href}))
                .collect(),
        )
    }

    #[test]
    fn absolutizes_and_classifies_links() {
        let raw = raw_links(&["/about", "https://other.example/page", "contact.html"]);
        let out = process_links(raw, "https://example.com/index.html", &ExtractionConfig::default());

        assert_eq!(out["total_links"], 3);
        assert_eq!(out["internal_links"], 2);
        assert_eq!(out["external_links"], 1);
        assert_eq!(out["links"][0]["url"], "https://example.com/about");
        assert_eq!(out["links"][2]["url"], "https://example.com/contact.html");
    }

    #[test]
    fn deduplicates_and_drops_non_http_schemes() {
        let raw = raw_links(&["/a", "/a", "mailto:x@example.com", "javascript:void(0)"]);
        let out = process_links(raw, "https://example.com/", &ExtractionConfig::default());
        assert_eq!(out["total_links"], 1);
    }

    #[test]
    fn honors_max_links_and_filters() {
        let raw = raw_links(&["/1", "/2", "/track/click", "/3", "/4"]);
        let config = ExtractionConfig {
            link_filters: vec!["/track/".into()],
            max_links: Some(3),
            ..Default::default()
        };
        let out = process_links(raw, "https://example.com/", &config);
        assert_eq!(out["total_links"], 3);
        let urls: Vec<_> = out["links"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["url"].as_str().unwrap().to_string())
            .collect();
        assert!(!urls.iter().any(|u| u.contains("/track/")));
    }

    #[test]
    fn internal_only_mode_drops_external() {
        let raw = raw_links(&["/in", "https://other.example/out"]);
        let config = ExtractionConfig {
            include_external_links: false,
            ..Default::default()
        };
        let out = process_links(raw, "https://example.com/", &config);
        assert_eq!(out["total_links"], 1);
        assert_eq!(out["links"][0]["is_internal"], true);
    }

    #[test]
    fn flags_media_links() {
        let raw = raw_links(&["/brochure.pdf", "/page"]);
        let out = process_links(raw, "https://example.com/", &ExtractionConfig::default());
        assert_eq!(out["links"][0]["is_media"], true);
        assert_eq!(out["links"][1]["is_media"], false);
    }
}
