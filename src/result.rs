//! Crawl result types
//!
//! A `CrawlResult` is assembled once per crawl by the aggregator and is
//! immutable afterwards. Per-extractor payloads stay as `serde_json::Value`
//! so the orchestrator can treat all extractors uniformly; the derived stats
//! give typed access to the numbers callers actually branch on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// The closed set of extractor variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    Text,
    Links,
    Images,
    Structured,
    Forms,
}

impl ExtractorKind {
    pub const ALL: [ExtractorKind; 5] = [
        ExtractorKind::Text,
        ExtractorKind::Links,
        ExtractorKind::Images,
        ExtractorKind::Structured,
        ExtractorKind::Forms,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ExtractorKind::Text => "text",
            ExtractorKind::Links => "links",
            ExtractorKind::Images => "images",
            ExtractorKind::Structured => "structured",
            ExtractorKind::Forms => "forms",
        }
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one extractor run. Created once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub extractor: ExtractorKind,
    pub success: bool,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock time the extractor spent on the page
    pub duration_ms: u64,
}

impl ExtractionOutcome {
    pub fn ok(extractor: ExtractorKind, data: serde_json::Value, duration: Duration) -> Self {
        Self {
            extractor,
            success: true,
            data,
            error: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn failed(extractor: ExtractorKind, error: String, duration: Duration) -> Self {
        Self {
            extractor,
            success: false,
            data: serde_json::Value::Null,
            error: Some(error),
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// Metadata about the navigation itself, independent of any extractor.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NavMetadata {
    /// URL after redirects; equals the requested URL when no redirect happened
    pub final_url: String,
    pub redirected: bool,
    pub nav_duration_ms: u64,
    /// Proxy endpoint the crawl went through, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Navigation attempts consumed (1 = first try succeeded)
    pub attempts: u32,
}

/// Counts computed strictly from the outcomes present. A disabled or absent
/// extractor contributes zero, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct DerivedStats {
    pub word_count: usize,
    pub content_length: usize,
    pub total_links: usize,
    pub internal_links: usize,
    pub external_links: usize,
    pub total_images: usize,
    pub total_forms: usize,
    pub successful_extractors: Vec<String>,
    pub failed_extractors: Vec<String>,
}

/// Outcome of the optional LLM post-processing pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// One crawl's complete, immutable result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub overall_success: bool,
    pub outcomes: BTreeMap<ExtractorKind, ExtractionOutcome>,
    pub derived: DerivedStats,
    pub nav: NavMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmOutcome>,
    /// Terminal error when the crawl as a whole failed (e.g. navigation
    /// retries exhausted). Extractor-level errors live on their outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CrawlResult {
    /// Terminal failure result: no outcomes, the error recorded at top level.
    pub fn failure(url: &str, error: String, attempts: u32) -> Self {
        Self {
            url: url.to_string(),
            timestamp: Utc::now(),
            overall_success: false,
            outcomes: BTreeMap::new(),
            derived: DerivedStats::default(),
            nav: NavMetadata {
                final_url: url.to_string(),
                attempts,
                ..Default::default()
            },
            llm: None,
            error: Some(error),
        }
    }

    pub fn outcome(&self, kind: ExtractorKind) -> Option<&ExtractionOutcome> {
        self.outcomes.get(&kind)
    }

    pub fn has_outcome(&self, kind: ExtractorKind) -> bool {
        self.outcomes.contains_key(&kind)
    }
}

impl fmt::Display for CrawlResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CrawlResult({} {}, {} extractors)",
            if self.overall_success { "ok" } else { "failed" },
            self.url,
            self.derived.successful_extractors.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_result_has_no_outcomes() {
        let result = CrawlResult::failure("https://example.com", "timed out".into(), 3);
        assert!(!result.overall_success);
        assert!(result.outcomes.is_empty());
        assert_eq!(result.nav.attempts, 3);
        assert_eq!(result.error.as_deref(), Some("timed out"));
        assert_eq!(result.derived, DerivedStats::default());
    }

    #[test]
    fn outcome_serialization_skips_absent_error() {
        let outcome = ExtractionOutcome::ok(
            ExtractorKind::Text,
            serde_json::json!({"content": "hi"}),
            Duration::from_millis(12),
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["extractor"], "text");
    }

    #[test]
    fn extractor_kind_names_are_stable() {
        let names: Vec<_> = ExtractorKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names, vec!["text", "links", "images", "structured", "forms"]);
    }
}
