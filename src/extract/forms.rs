//! Form extraction

use async_trait::async_trait;
use chromiumoxide::page::Page;
use serde_json::{json, Value};

use super::{eval_json, Extractor};
use crate::config::ExtractionConfig;
use crate::error::SpiderResult;
use crate::result::ExtractorKind;

const FORMS_SCRIPT: &str = r#"
(() => {
    const forms = [];
    document.querySelectorAll('form').forEach(form => {
        const inputs = [];
        form.querySelectorAll('input, textarea, select').forEach(input => {
            inputs.push({
                name: input.name || '',
                type: input.type || input.tagName.toLowerCase(),
                required: !!input.required,
                placeholder: input.placeholder || '',
            });
        });
        const buttons = [];
        form.querySelectorAll('button, input[type="submit"]').forEach(button => {
            buttons.push({
                text: (button.textContent || button.value || '').trim(),
                type: button.type || '',
            });
        });
        forms.push({
            id: form.id || '',
            name: form.getAttribute('name') || '',
            action: form.getAttribute('action') || '',
            method: (form.method || 'get').toLowerCase(),
            inputs: inputs,
            buttons: buttons,
        });
    });
    return forms;
})()
"#;

pub struct FormExtractor;

#[async_trait]
impl Extractor for FormExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Forms
    }

    async fn extract(
        &self,
        page: &Page,
        _config: &ExtractionConfig,
    ) -> SpiderResult<serde_json::Value> {
        let raw = eval_json(page, FORMS_SCRIPT).await?;
        Ok(process_forms(raw))
    }
}

/// Pure post-processing: derive the field/button totals the aggregator and
/// result summaries report.
pub(crate) fn process_forms(raw: Value) -> Value {
    let forms = raw.as_array().cloned().unwrap_or_default();
    let input_fields: usize = forms
        .iter()
        .map(|f| f.get("inputs").and_then(|i| i.as_array()).map(|a| a.len()).unwrap_or(0))
        .sum();
    let buttons: usize = forms
        .iter()
        .map(|f| f.get("buttons").and_then(|b| b.as_array()).map(|a| a.len()).unwrap_or(0))
        .sum();

    json!({
        "forms": forms,
        "total_forms": forms.len(),
        "input_fields": input_fields,
        "buttons": buttons,
    })
}
