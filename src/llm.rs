//! LLM post-processing
//!
//! Sends the aggregated page text to an OpenAI-compatible chat completions
//! endpoint and parses the schema-constrained JSON the model returns. A
//! failing enhancement degrades the crawl result (`llm.success = false`); it
//! never fails the crawl itself. That guarantee lives in the orchestrator,
//! which maps every error here into an `LlmOutcome`.

use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Page text beyond this many characters is truncated before prompting.
const MAX_PROMPT_CHARS: usize = 24_000;

pub struct LlmEnhancer {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LlmEnhancer {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Ask the model to extract structured data from `page_text`. Returns
    /// the parsed JSON object on success.
    pub async fn enhance(&self, page_text: &str) -> Result<Value, LlmError> {
        let api_key = std::env::var(&self.config.api_key_env).map_err(|_| {
            LlmError::Provider(format!(
                "credential environment variable {} is not set",
                self.config.api_key_env
            ))
        })?;

        let prompt = self.build_prompt(page_text);
        let body = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "response_format": {"type": "json_object"},
            "messages": [
                {
                    "role": "system",
                    "content": "You extract structured data from web page text. \
                                Respond with a single JSON object and nothing else."
                },
                {"role": "user", "content": prompt}
            ],
        });

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let request = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(api_key)
            .json(&body)
            .send();

        let response = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| LlmError::Timeout(self.config.timeout_secs))?
            .map_err(|e| LlmError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Provider(format!(
                "provider returned HTTP {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Provider(format!("unreadable provider response: {e}")))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::Provider("response carries no message content".into()))?;

        debug!(chars = content.len(), "received LLM completion");
        let extracted = parse_model_json(content)?;
        check_schema(&extracted, self.config.output_schema.as_ref())?;
        Ok(extracted)
    }

    fn build_prompt(&self, page_text: &str) -> String {
        let truncated: String = page_text.chars().take(MAX_PROMPT_CHARS).collect();
        let instruction = self
            .config
            .extraction_prompt
            .as_deref()
            .unwrap_or("Extract the key facts from this page as a flat JSON object.");

        match &self.config.output_schema {
            Some(schema) => format!(
                "{instruction}\n\nThe JSON object must conform to this schema:\n{}\n\nPage text:\n{truncated}",
                serde_json::to_string_pretty(schema).unwrap_or_default()
            ),
            None => format!("{instruction}\n\nPage text:\n{truncated}"),
        }
    }
}

/// Models occasionally wrap JSON in markdown fences; strip them before
/// parsing.
fn parse_model_json(content: &str) -> Result<Value, LlmError> {
    let trimmed = content.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(stripped)
        .map_err(|e| LlmError::SchemaMismatch(format!("output is not valid JSON: {e}")))
}

/// Shallow schema check: the model output must be an object and carry every
/// `required` property the schema names.
fn check_schema(value: &Value, schema: Option<&Value>) -> Result<(), LlmError> {
    let Some(schema) = schema else {
        return Ok(());
    };

    let Some(object) = value.as_object() else {
        return Err(LlmError::SchemaMismatch("output is not a JSON object".into()));
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !object.contains_key(key) {
                return Err(LlmError::SchemaMismatch(format!(
                    "missing required property '{key}'"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_fenced_json() {
        assert_eq!(parse_model_json("{\"a\": 1}").unwrap()["a"], 1);
        assert_eq!(
            parse_model_json("```json\n{\"a\": 2}\n```").unwrap()["a"],
            2
        );
        assert!(parse_model_json("not json at all").is_err());
    }

    #[test]
    fn schema_check_requires_named_properties() {
        let schema = json!({"type": "object", "required": ["title", "price"]});
        let ok = json!({"title": "x", "price": 3});
        assert!(check_schema(&ok, Some(&schema)).is_ok());

        let missing = json!({"title": "x"});
        assert!(matches!(
            check_schema(&missing, Some(&schema)),
            Err(LlmError::SchemaMismatch(_))
        ));

        let not_object = json!([1, 2]);
        assert!(check_schema(&not_object, Some(&schema)).is_err());
    }

    #[test]
    fn schema_check_passes_without_schema() {
        assert!(check_schema(&json!([1]), None).is_ok());
    }

    #[test]
    fn prompt_includes_schema_and_truncates() {
        let config = LlmConfig {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            temperature: 0.1,
            max_tokens: 100,
            timeout_secs: 10,
            extraction_prompt: Some("Pull out the product info.".into()),
            output_schema: Some(json!({"required": ["name"]})),
        };
        let enhancer = LlmEnhancer::new(config);
        let long_text = "x".repeat(MAX_PROMPT_CHARS * 2);
        let prompt = enhancer.build_prompt(&long_text);
        assert!(prompt.starts_with("Pull out the product info."));
        assert!(prompt.contains("required"));
        assert!(prompt.len() < MAX_PROMPT_CHARS + 1_000);
    }
}
