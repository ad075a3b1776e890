//! Structured data extraction: JSON-LD, meta/OpenGraph pairs and tables

use async_trait::async_trait;
use chromiumoxide::page::Page;
use serde_json::{json, Value};

use super::{eval_json, Extractor};
use crate::config::ExtractionConfig;
use crate::error::SpiderResult;
use crate::result::ExtractorKind;

const STRUCTURED_SCRIPT: &str = r#"
(() => {
    const jsonLd = [];
    document.querySelectorAll('script[type="application/ld+json"]').forEach(el => {
        try {
            jsonLd.push(JSON.parse(el.textContent));
        } catch (e) {
            // malformed block, skip it
        }
    });

    const meta = {};
    document.querySelectorAll('meta[name], meta[property]').forEach(tag => {
        const key = tag.getAttribute('name') || tag.getAttribute('property');
        if (key && tag.content) {
            meta[key] = tag.content;
        }
    });

    const tables = [];
    document.querySelectorAll('table').forEach(table => {
        const headers = Array.from(table.querySelectorAll('th'))
            .map(th => (th.textContent || '').trim());
        const rows = [];
        table.querySelectorAll('tr').forEach(tr => {
            const cells = Array.from(tr.querySelectorAll('td'))
                .map(td => (td.textContent || '').trim());
            if (cells.length > 0) {
                rows.push(cells);
            }
        });
        if (headers.length > 0 || rows.length > 0) {
            tables.push({ headers: headers, rows: rows });
        }
    });

    return { json_ld: jsonLd, meta: meta, tables: tables };
})()
"#;

pub struct StructuredExtractor;

#[async_trait]
impl Extractor for StructuredExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Structured
    }

    async fn extract(
        &self,
        page: &Page,
        _config: &ExtractionConfig,
    ) -> SpiderResult<serde_json::Value> {
        let raw = eval_json(page, STRUCTURED_SCRIPT).await?;
        Ok(process_structured(raw))
    }
}

/// Pure post-processing: add totals; pass the payload through untouched.
pub(crate) fn process_structured(raw: Value) -> Value {
    let json_ld = raw.get("json_ld").cloned().unwrap_or_else(|| json!([]));
    let meta = raw.get("meta").cloned().unwrap_or_else(|| json!({}));
    let tables = raw.get("tables").cloned().unwrap_or_else(|| json!([]));
    let total_tables = tables.as_array().map(|t| t.len()).unwrap_or(0);

    json!({
        "json_ld": json_ld,
        "meta": meta,
        "tables": tables,
        "total_tables": total_tables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_tables() {
        let raw = json!({
            "json_ld": [{"@type": "Article"}],
            "meta": {"og:title": "Hello"},
            "tables": [
                {"headers": ["a"], "rows": [["1"]]},
                {"headers": [], "rows": [["x", "y"]]}
            ]
        });
        let out = process_structured(raw);
        assert_eq!(out["total_tables"], 2);
        assert_eq!(out["json_ld"][0]["@type"], "Article");
        assert_eq!(out["meta"]["og:title"], "Hello");
    }

    #[test]
    fn tolerates_missing_sections() {
        let out = process_structured(json!({}));
        assert_eq!(out["total_tables"], 0);
        assert_eq!(out["json_ld"], json!([]));
        assert_eq!(out["meta"], json!({}));
    }
}
