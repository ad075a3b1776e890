//! Image extraction with dimension and format filters

use async_trait::async_trait;
use chromiumoxide::page::Page;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use url::Url;

use super::{eval_json, Extractor};
use crate::config::ExtractionConfig;
use crate::error::SpiderResult;
use crate::result::ExtractorKind;

const IMAGES_SCRIPT: &str = r#"
(() => {
    const images = [];
    document.querySelectorAll('img[src]').forEach(img => {
        images.push({
            src: img.getAttribute('src') || '',
            alt: img.alt || '',
            title: img.title || '',
            width: img.naturalWidth || img.width || 0,
            height: img.naturalHeight || img.height || 0,
        });
    });
    return images;
})()
"#;

pub struct ImageExtractor;

#[async_trait]
impl Extractor for ImageExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Images
    }

    async fn extract(
        &self,
        page: &Page,
        config: &ExtractionConfig,
    ) -> SpiderResult<serde_json::Value> {
        let raw = eval_json(page, IMAGES_SCRIPT).await?;
        let base_url = page.url().await.ok().flatten().unwrap_or_default();
        Ok(process_images(raw, &base_url, config))
    }
}

/// Pure post-processing: absolutize, dedup, apply dimension/format filters,
/// cap at max_images, then derive the format histogram and average
/// dimensions.
pub(crate) fn process_images(raw: Value, base_url: &str, config: &ExtractionConfig) -> Value {
    let base = Url::parse(base_url).ok();

    let mut seen: HashSet<String> = HashSet::new();
    let mut images = Vec::new();
    let mut by_format: BTreeMap<String, usize> = BTreeMap::new();
    let mut width_sum = 0u64;
    let mut height_sum = 0u64;

    for item in raw.as_array().cloned().unwrap_or_default() {
        let src = item.get("src").and_then(|v| v.as_str()).unwrap_or("");
        if src.is_empty() {
            continue;
        }

        let absolute = match &base {
            Some(base) => match base.join(src) {
                Ok(joined) => joined,
                Err(_) => continue,
            },
            None => match Url::parse(src) {
                Ok(parsed) => parsed,
                Err(_) => continue,
            },
        };

        let absolute_str = absolute.to_string();
        if config.deduplicate && !seen.insert(absolute_str.clone()) {
            continue;
        }

        let width = item.get("width").and_then(|v| v.as_u64()).unwrap_or(0);
        let height = item.get("height").and_then(|v| v.as_u64()).unwrap_or(0);
        if width < config.min_image_width as u64 || height < config.min_image_height as u64 {
            continue;
        }

        let format = format_of(absolute.path());
        if !config.image_formats.is_empty() {
            match &format {
                Some(ext) if config.image_formats.iter().any(|f| f == ext) => {}
                // data/extension-less URLs pass when no extension is known
                None => {}
                Some(_) => continue,
            }
        }

        if let Some(ext) = &format {
            *by_format.entry(ext.clone()).or_insert(0) += 1;
        }
        width_sum += width;
        height_sum += height;

        images.push(json!({
            "url": absolute_str,
            "alt": item.get("alt").cloned().unwrap_or(Value::String(String::new())),
            "title": item.get("title").cloned().unwrap_or(Value::String(String::new())),
            "width": width,
            "height": height,
            "format": format,
        }));

        if let Some(max) = config.max_images {
            if images.len() >= max {
                break;
            }
        }
    }

    let avg_dimensions = if images.is_empty() {
        json!({})
    } else {
        json!({
            "width": width_sum as f64 / images.len() as f64,
            "height": height_sum as f64 / images.len() as f64,
        })
    };

    json!({
        "images": images,
        "total_images": images.len(),
        "by_format": by_format,
        "avg_dimensions": avg_dimensions,
    })
}

fn format_of(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 4 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
